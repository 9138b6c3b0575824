//! Integration tests for the host and client state machines
//!
//! These tests run a real host and real clients over loopback TCP.

use assert_approx_eq::assert_approx_eq;
use client::network::{ClientContext, ClientState};
use server::network::{HostContext, HostState, PollOutcome};
use shared::{
    codec, CodecError, GameStateSnapshot, Key, NetConfig, NetError, NetworkMessage, Payload,
    PlayerInputBatch, RejectReason, HEADER_SIZE,
};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_test::assert_ok;

fn host_config(max_peers: usize) -> NetConfig {
    NetConfig {
        bind_host: "127.0.0.1".to_string(),
        port: 0,
        max_peers,
        heartbeat_interval: Duration::from_millis(100),
        ..NetConfig::default()
    }
}

fn client_config() -> NetConfig {
    NetConfig {
        heartbeat_interval: Duration::from_millis(100),
        ..NetConfig::default()
    }
}

/// Connects a client and drives the host until it has taken the connection
async fn join(host: &mut HostContext) -> (ClientContext, usize) {
    let port = host.local_addr().unwrap().port();
    let mut client = ClientContext::new(client_config());
    client.connect("127.0.0.1", port).await.unwrap();

    for _ in 0..200 {
        let outcome = host.poll_and_dispatch().await.unwrap();
        if let Some(&slot) = outcome.accepted.first() {
            return (client, slot);
        }
    }
    panic!("Host never accepted the client");
}

async fn poll_until<F>(host: &mut HostContext, mut done: F) -> PollOutcome
where
    F: FnMut(&PollOutcome) -> bool,
{
    for _ in 0..200 {
        let outcome = host.poll_and_dispatch().await.unwrap();
        if done(&outcome) {
            return outcome;
        }
    }
    panic!("Condition never reached while polling the host");
}

async fn receive_next(client: &mut ClientContext) -> NetworkMessage {
    for _ in 0..200 {
        if let Some(message) = client.receive().await.unwrap() {
            return message;
        }
    }
    panic!("Client never received a message");
}

fn game_state(score: i32) -> NetworkMessage {
    NetworkMessage::game_state(GameStateSnapshot {
        score,
        elapsed_time: score as f32 * 0.5,
        ..GameStateSnapshot::default()
    })
    .unwrap()
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Input travels client to host, a snapshot travels back
    #[tokio::test]
    async fn input_and_snapshot_exchange() {
        let mut host = HostContext::bind(host_config(2)).await.unwrap();
        let (mut client, slot) = join(&mut host).await;
        assert_eq!(host.state(), HostState::Running);

        let input = PlayerInputBatch::new(0.1).with_key(Key::MoveLeft);
        client
            .send(&NetworkMessage::player_input(input).unwrap())
            .unwrap();

        let outcome = poll_until(&mut host, |outcome| outcome.processed > 0).await;
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.inbound.len(), 1);
        assert_eq!(outcome.inbound[0].slot, slot);
        assert_eq!(
            outcome.inbound[0].message.message_type(),
            Some(shared::MessageType::PlayerInput)
        );
        assert!(outcome.inbound[0].input().unwrap().is_pressed(Key::MoveLeft));

        assert_eq!(assert_ok!(host.broadcast(&game_state(100))), 1);

        match receive_next(&mut client).await.payload {
            Payload::GameState(state) => {
                assert_eq!(state.score, 100);
                assert_approx_eq!(state.elapsed_time, 50.0);
            }
            other => panic!("Unexpected payload: {:?}", other),
        }
        assert_eq!(client.peer_id(), Some(slot as u32));
    }

    /// Two clients get distinct slots and both see a broadcast
    #[tokio::test]
    async fn broadcast_reaches_every_client() {
        let mut host = HostContext::bind(host_config(2)).await.unwrap();
        let (mut first, slot_a) = join(&mut host).await;
        let (mut second, slot_b) = join(&mut host).await;
        assert_ne!(slot_a, slot_b);

        assert_eq!(host.broadcast(&game_state(42)).unwrap(), 2);

        for client in [&mut first, &mut second] {
            match receive_next(client).await.payload {
                Payload::GameState(state) => assert_eq!(state.score, 42),
                other => panic!("Unexpected payload: {:?}", other),
            }
        }
        assert_eq!(first.peer_id(), Some(slot_a as u32));
        assert_eq!(second.peer_id(), Some(slot_b as u32));
    }

    /// A full host turns the extra client away with a reject notice
    #[tokio::test]
    async fn full_host_rejects_extra_client() {
        let mut host = HostContext::bind(host_config(1)).await.unwrap();
        let (_first, _) = join(&mut host).await;

        let port = host.local_addr().unwrap().port();
        let mut extra = ClientContext::new(client_config());
        extra.connect("127.0.0.1", port).await.unwrap();

        let mut rejected = false;
        for _ in 0..200 {
            host.poll_and_dispatch().await.unwrap();
            match extra.receive().await {
                Err(NetError::Rejected(RejectReason::ServerFull)) => {
                    rejected = true;
                    break;
                }
                Ok(_) => {}
                Err(e) => panic!("Unexpected error: {}", e),
            }
        }

        assert!(rejected);
        assert_eq!(extra.state(), ClientState::Disconnected);
        assert_eq!(host.peer_count(), 1);
    }

    /// A client's goodbye frees its slot for the next client
    #[tokio::test]
    async fn client_disconnect_frees_slot() {
        let mut host = HostContext::bind(host_config(1)).await.unwrap();
        let (mut client, slot) = join(&mut host).await;

        client.disconnect().await;
        let outcome = poll_until(&mut host, |outcome| !outcome.disconnected.is_empty()).await;
        assert_eq!(outcome.disconnected, vec![slot]);
        assert_eq!(host.peer_count(), 0);

        let (_next, reused) = join(&mut host).await;
        assert_eq!(reused, slot);
    }

    /// Host shutdown reaches the client as a Disconnect, then a closed socket
    #[tokio::test]
    async fn host_shutdown_ends_client_session() {
        let mut host = HostContext::bind(host_config(2)).await.unwrap();
        let (mut client, _) = join(&mut host).await;

        host.shutdown().await;

        assert_eq!(receive_next(&mut client).await.payload, Payload::Disconnect);
        let mut result = client.receive().await;
        for _ in 0..200 {
            if !matches!(result, Ok(None)) {
                break;
            }
            result = client.receive().await;
        }
        assert!(matches!(result, Err(NetError::Disconnected)));
    }
}

/// LIVENESS TESTS
mod liveness_tests {
    use super::*;

    /// A client heartbeat refreshes the host's view of that peer
    #[tokio::test]
    async fn client_heartbeat_keeps_peer_alive() {
        let mut host = HostContext::bind(host_config(2)).await.unwrap();
        let (mut client, slot) = join(&mut host).await;
        let interval = client.config().heartbeat_interval;
        let stamped = host.peer_info(slot).unwrap().last_heartbeat;

        let probe_at = client.last_heartbeat() + interval * 2 + Duration::from_millis(1);
        client.check_liveness_at(probe_at).unwrap();

        poll_until(&mut host, |outcome| outcome.processed > 0).await;
        let refreshed = host.peer_info(slot).unwrap().last_heartbeat;
        assert!(refreshed > stamped);

        assert_eq!(host.check_liveness_at(refreshed + interval * 3).unwrap(), 0);
        assert!(host.is_connected(slot));
    }

    /// A silent peer is dropped and only that peer
    #[tokio::test]
    async fn silent_peer_expires_alone() {
        let mut host = HostContext::bind(host_config(2)).await.unwrap();
        let (_quiet, slot_a) = join(&mut host).await;
        let (mut chatty, slot_b) = join(&mut host).await;
        let interval = host.config().heartbeat_interval;

        chatty.send(&NetworkMessage::heartbeat()).unwrap();
        poll_until(&mut host, |outcome| outcome.processed > 0).await;
        let b_stamp = host.peer_info(slot_b).unwrap().last_heartbeat;

        // Exactly three intervals after B's heartbeat; A was stamped earlier
        assert_eq!(host.check_liveness_at(b_stamp + interval * 3).unwrap(), 1);
        assert!(!host.is_connected(slot_a));
        assert!(host.is_connected(slot_b));
        assert_eq!(host.peer_info(slot_b).unwrap().last_heartbeat, b_stamp);
        assert_eq!(host.broadcast(&game_state(1)).unwrap(), 1);
    }

    /// A client that stops probing gives up after three intervals
    #[tokio::test]
    async fn client_times_out_without_heartbeats() {
        let mut host = HostContext::bind(host_config(1)).await.unwrap();
        let (mut client, _) = join(&mut host).await;
        let interval = client.config().heartbeat_interval;

        let late = client.last_heartbeat() + interval * 3 + Duration::from_millis(1);
        match client.check_liveness_at(late) {
            Err(NetError::Timeout { .. }) => {}
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }
}

/// STREAM HANDLING TESTS
mod stream_tests {
    use super::*;

    async fn raw_peer(host: &mut HostContext) -> (TcpStream, usize) {
        let stream = TcpStream::connect(host.local_addr().unwrap()).await.unwrap();
        stream.set_nodelay(true).unwrap();
        for _ in 0..200 {
            if let Some(slot) = host.accept().await.unwrap() {
                return (stream, slot);
            }
        }
        panic!("Host never accepted the raw peer");
    }

    /// A message split across two writes is reassembled
    #[tokio::test]
    async fn split_message_is_reassembled() {
        let mut host = HostContext::bind(host_config(2)).await.unwrap();
        let (mut peer, slot) = raw_peer(&mut host).await;

        let bytes = codec::encode_to_vec(
            &NetworkMessage::player_input(PlayerInputBatch::new(2.0).with_key(Key::Hold))
                .unwrap(),
        )
        .unwrap();

        peer.write_all(&bytes[..7]).await.unwrap();
        for _ in 0..5 {
            let outcome = host.poll_and_dispatch().await.unwrap();
            assert_eq!(outcome.processed, 0);
        }

        sleep(Duration::from_millis(5)).await;
        peer.write_all(&bytes[7..]).await.unwrap();

        let outcome = poll_until(&mut host, |outcome| outcome.processed > 0).await;
        assert_eq!(outcome.inbound[0].slot, slot);
        assert!(outcome.inbound[0].input().unwrap().is_pressed(Key::Hold));
    }

    /// Several messages in one write are all delivered, in order
    #[tokio::test]
    async fn coalesced_messages_are_split() {
        let mut host = HostContext::bind(host_config(2)).await.unwrap();
        let (mut peer, _) = raw_peer(&mut host).await;

        let mut bytes = Vec::new();
        for t in [1.0, 2.0, 3.0] {
            let message = NetworkMessage::player_input(PlayerInputBatch::new(t)).unwrap();
            bytes.extend(codec::encode_to_vec(&message).unwrap());
        }
        peer.write_all(&bytes).await.unwrap();

        let mut timestamps = Vec::new();
        poll_until(&mut host, |outcome| {
            for inbound in &outcome.inbound {
                timestamps.push(inbound.input().unwrap().timestamp);
            }
            timestamps.len() >= 3
        })
        .await;
        assert_eq!(timestamps, vec![1.0, 2.0, 3.0]);
    }

    /// Corrupt and invalid messages are dropped; the connection survives
    #[tokio::test]
    async fn bad_messages_do_not_drop_peer() {
        let mut host = HostContext::bind(host_config(2)).await.unwrap();
        let (mut peer, slot) = raw_peer(&mut host).await;

        let mut corrupt = codec::encode_to_vec(&game_state(5)).unwrap();
        corrupt[HEADER_SIZE + 2] ^= 0x80;

        let unknown = codec::encode_to_vec(
            &NetworkMessage::with_kind(77, Payload::Raw(vec![1, 2, 3, 4])).unwrap(),
        )
        .unwrap();

        peer.write_all(&corrupt).await.unwrap();
        peer.write_all(&unknown).await.unwrap();
        peer.write_all(&codec::encode_to_vec(&NetworkMessage::heartbeat()).unwrap())
            .await
            .unwrap();

        let mut processed = 0;
        poll_until(&mut host, |outcome| {
            processed += outcome.processed;
            processed >= 1
        })
        .await;

        assert_eq!(processed, 1);
        assert!(host.is_connected(slot));
    }
}

/// CODEC EDGE CASES
mod codec_tests {
    use super::*;

    /// Every cut short of the declared size fails with the matching truncation error
    #[test]
    fn truncation_errors_by_length() {
        let bytes = codec::encode_to_vec(&game_state(9)).unwrap();

        for len in 0..bytes.len() {
            match codec::decode(&bytes[..len]) {
                Err(CodecError::TruncatedHeader { .. }) => assert!(len < HEADER_SIZE),
                Err(CodecError::TruncatedPayload { declared, available }) => {
                    assert!(len >= HEADER_SIZE);
                    assert_eq!(declared, bytes.len());
                    assert_eq!(available, len);
                }
                other => panic!("Unexpected result at length {}: {:?}", len, other),
            }
        }
        assert!(codec::decode(&bytes).is_ok());
    }
}
