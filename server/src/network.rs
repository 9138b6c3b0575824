//! Host network layer: listening socket, peer slots and per-tick dispatch
//!
//! The host is driven from a single task. Every operation awaits at most one
//! bounded readiness wait and otherwise uses non-blocking reads and writes, so
//! the caller's tick loop never stalls on a slow or silent peer.

use crate::client_manager::{Client, ClientManager, PeerInfo};
use log::{debug, error, info, warn};
use shared::{
    codec, validate, ConnectAccept, ConnectReject, LivenessPolicy, NetConfig, NetError,
    NetworkMessage, Payload, PlayerInputBatch, RejectReason,
};
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Host lifecycle; `Shutdown` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Idle,
    Listening,
    Running,
    Shutdown,
}

/// A game-relevant message received from a peer
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub slot: usize,
    pub message: NetworkMessage,
}

impl Inbound {
    pub fn input(&self) -> Option<&PlayerInputBatch> {
        match &self.message.payload {
            Payload::PlayerInput(input) => Some(input),
            _ => None,
        }
    }
}

/// Everything one call to [`HostContext::poll_and_dispatch`] observed
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Valid messages decoded this tick, administrative ones included
    pub processed: usize,
    pub accepted: Vec<usize>,
    pub disconnected: Vec<usize>,
    /// Player inputs to hand to the simulation, in arrival order per peer
    pub inbound: Vec<Inbound>,
}

#[derive(Debug, Default)]
struct Readiness {
    listener: bool,
    peers: Vec<usize>,
}

impl Readiness {
    fn is_empty(&self) -> bool {
        !self.listener && self.peers.is_empty()
    }
}

enum ReadResult {
    Messages(Vec<NetworkMessage>),
    Closed,
    Failed(io::Error),
}

enum SendStatus {
    Sent,
    WouldBlock,
}

/// Authoritative side of a session
pub struct HostContext {
    config: NetConfig,
    state: HostState,
    listener: Option<TcpListener>,
    clients: ClientManager<TcpStream>,
    /// Connection taken off the listener during a readiness poll but not yet admitted
    pending: Option<(TcpStream, SocketAddr)>,
    policy: LivenessPolicy,
    scratch: Vec<u8>,
}

impl HostContext {
    pub fn new(config: NetConfig) -> Self {
        Self {
            clients: ClientManager::new(config.max_peers, config.recv_buffer_size),
            policy: LivenessPolicy::new(config.heartbeat_interval),
            scratch: vec![0u8; config.recv_buffer_size],
            state: HostState::Idle,
            listener: None,
            pending: None,
            config,
        }
    }

    /// Creates a host and starts listening in one step
    pub async fn bind(config: NetConfig) -> Result<Self, NetError> {
        let mut host = Self::new(config);
        host.start().await?;
        Ok(host)
    }

    /// Binds the listening socket, moving `Idle` to `Listening`
    pub async fn start(&mut self) -> Result<SocketAddr, NetError> {
        match self.state {
            HostState::Shutdown => return Err(NetError::Closed),
            HostState::Listening | HostState::Running => {
                if let Some(addr) = self.local_addr() {
                    return Ok(addr);
                }
            }
            HostState::Idle => {}
        }

        let listener = TcpListener::bind(self.config.bind_addr())
            .await
            .map_err(NetError::InitFailed)?;
        let addr = listener.local_addr().map_err(NetError::InitFailed)?;

        info!(
            "Host listening on {} ({} peer slots)",
            addr,
            self.clients.capacity()
        );
        self.listener = Some(listener);
        self.state = HostState::Listening;
        Ok(addr)
    }

    /// Admits one waiting connection into the lowest free slot
    ///
    /// Returns `Ok(None)` when no connection arrives within the poll timeout.
    pub async fn accept(&mut self) -> Result<Option<usize>, NetError> {
        self.ensure_listening()?;
        if self.clients.is_full() {
            return Err(NetError::CapacityExceeded {
                capacity: self.clients.capacity(),
            });
        }

        let (stream, addr) = match self.pending.take() {
            Some(connection) => connection,
            None => match self.next_connection().await? {
                Some(connection) => connection,
                None => return Ok(None),
            },
        };

        Ok(self.admit(stream, addr).await)
    }

    /// One tick of network work: readiness wait, at most one accept, one read per ready peer
    pub async fn poll_and_dispatch(&mut self) -> Result<PollOutcome, NetError> {
        self.ensure_listening()?;
        let mut outcome = PollOutcome::default();
        let readiness = self.wait_ready().await;

        if readiness.listener {
            self.dispatch_accept(&mut outcome).await;
        }

        for slot in readiness.peers {
            self.receive_from(slot, &mut outcome);
        }

        Ok(outcome)
    }

    /// Sends the same bytes to every connected peer
    ///
    /// Peers that would block miss this message. Returns how many peers received
    /// it, zero included; fails only if every connected peer hard-failed.
    pub fn broadcast(&mut self, message: &NetworkMessage) -> Result<usize, NetError> {
        self.ensure_open()?;
        let bytes = codec::encode_to_vec(message)?;
        let slots = self.clients.connected_slots();

        let mut sent = 0;
        let mut failed = 0;
        for &slot in &slots {
            match self.send_bytes(slot, &bytes) {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(_) => failed += 1,
            }
        }

        if !slots.is_empty() && failed == slots.len() {
            return Err(NetError::AllSendsFailed {
                attempted: slots.len(),
            });
        }
        Ok(sent)
    }

    /// Sends to one peer; `Ok(false)` means the send would have blocked
    pub fn send_to(&mut self, slot: usize, message: &NetworkMessage) -> Result<bool, NetError> {
        self.ensure_open()?;
        if !self.clients.is_connected(slot) {
            return Err(NetError::InvalidPeer(slot));
        }
        let bytes = codec::encode_to_vec(message)?;
        self.send_bytes(slot, &bytes)
    }

    pub fn check_liveness(&mut self) -> Result<usize, NetError> {
        self.check_liveness_at(Instant::now())
    }

    /// Force-disconnects every peer silent for more than three heartbeat intervals
    pub fn check_liveness_at(&mut self, now: Instant) -> Result<usize, NetError> {
        self.ensure_open()?;
        let expired = self.clients.expired(&self.policy, now);
        for &slot in &expired {
            warn!(
                "Peer {} missed heartbeats for over {:?}, disconnecting",
                slot,
                self.policy.expire_after()
            );
            self.disconnect_peer(slot);
        }
        Ok(expired.len())
    }

    /// Closes the listener and every peer; later operations fail with `Closed`
    pub async fn shutdown(&mut self) {
        if self.state == HostState::Shutdown {
            return;
        }

        let limit = self.config.host_poll_timeout;
        let farewell = codec::encode_to_vec(&NetworkMessage::disconnect());
        for mut client in self.clients.drain() {
            if let Ok(bytes) = &farewell {
                if !wait_writable(&client.stream, limit).await {
                    debug!("Peer {} not writable before shutdown", client.slot);
                }
                if let Err(e) = write_frame(&client.stream, bytes) {
                    debug!("Farewell to peer {} not delivered: {}", client.slot, e);
                }
            }
            if let Err(e) = client.stream.shutdown().await {
                debug!("Shutdown of peer {} socket failed: {}", client.slot, e);
            }
            info!("Closed connection to peer {}", client.slot);
        }

        self.pending = None;
        self.listener = None;
        self.state = HostState::Shutdown;
        info!("Host shut down");
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    pub fn capacity(&self) -> usize {
        self.clients.capacity()
    }

    pub fn peer_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_connected(&self, slot: usize) -> bool {
        self.clients.is_connected(slot)
    }

    pub fn connected_slots(&self) -> Vec<usize> {
        self.clients.connected_slots()
    }

    pub fn peer_info(&self, slot: usize) -> Option<PeerInfo> {
        self.clients.peer_info(slot)
    }

    fn ensure_open(&self) -> Result<(), NetError> {
        match self.state {
            HostState::Shutdown => Err(NetError::Closed),
            _ => Ok(()),
        }
    }

    fn ensure_listening(&self) -> Result<(), NetError> {
        match self.state {
            HostState::Shutdown => Err(NetError::Closed),
            HostState::Idle => Err(NetError::NotConnected),
            HostState::Listening | HostState::Running => Ok(()),
        }
    }

    async fn next_connection(&mut self) -> Result<Option<(TcpStream, SocketAddr)>, NetError> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(NetError::NotConnected);
        };
        match timeout(self.config.host_poll_timeout, listener.accept()).await {
            Ok(Ok(connection)) => Ok(Some(connection)),
            Ok(Err(e)) => {
                error!("Accept failed: {}", e);
                Err(NetError::AcceptFailed(e))
            }
            Err(_) => Ok(None),
        }
    }

    async fn admit(&mut self, stream: TcpStream, addr: SocketAddr) -> Option<usize> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }
        // try_write fails until the reactor has seen the new socket as writable
        if !wait_writable(&stream, self.config.host_poll_timeout).await {
            warn!("Connection from {} not writable yet", addr);
        }

        let slot = self.clients.add_client(addr, stream)?;
        self.state = HostState::Running;

        let welcome = NetworkMessage::new(Payload::ConnectAccept(ConnectAccept {
            peer_id: slot as u32,
        }))
        .and_then(|message| codec::encode_to_vec(&message));
        match welcome {
            Ok(bytes) => match self.send_bytes(slot, &bytes) {
                Ok(true) => {}
                Ok(false) => warn!("Handshake to peer {} would block, peer id not sent", slot),
                Err(e) => {
                    warn!("Peer {} dropped during handshake: {}", slot, e);
                    return None;
                }
            },
            Err(e) => error!("Failed to encode handshake for peer {}: {}", slot, e),
        }

        Some(slot)
    }

    async fn dispatch_accept(&mut self, outcome: &mut PollOutcome) {
        if self.clients.is_full() {
            if let Some((stream, addr)) = self.pending.take() {
                let limit = self.config.host_poll_timeout;
                reject(stream, addr, RejectReason::ServerFull, limit).await;
            }
            return;
        }

        match self.accept().await {
            Ok(Some(slot)) => outcome.accepted.push(slot),
            Ok(None) => {}
            Err(e) => warn!("Accept during poll failed: {}", e),
        }
    }

    async fn wait_ready(&mut self) -> Readiness {
        let Some(listener) = self.listener.as_ref() else {
            return Readiness::default();
        };
        let pending = &mut self.pending;
        let clients = &self.clients;

        let ready = poll_fn(|cx| poll_readiness(listener, &mut *pending, clients, cx));
        timeout(self.config.host_poll_timeout, ready)
            .await
            .unwrap_or_default()
    }

    fn receive_from(&mut self, slot: usize, outcome: &mut PollOutcome) {
        let Some(client) = self.clients.get_mut(slot) else {
            return;
        };

        match read_messages(client, &mut self.scratch) {
            ReadResult::Messages(messages) => {
                for message in messages {
                    if !self.clients.is_connected(slot) {
                        break;
                    }
                    outcome.processed += 1;
                    self.route(slot, message, outcome);
                }
            }
            ReadResult::Closed => {
                info!("Peer {} closed the connection", slot);
                self.disconnect_peer(slot);
                outcome.disconnected.push(slot);
            }
            ReadResult::Failed(e) => {
                warn!("Read from peer {} failed: {}", slot, e);
                self.disconnect_peer(slot);
                outcome.disconnected.push(slot);
            }
        }
    }

    fn route(&mut self, slot: usize, message: NetworkMessage, outcome: &mut PollOutcome) {
        match &message.payload {
            Payload::PlayerInput(_) => {
                debug!("Input from peer {}", slot);
                outcome.inbound.push(Inbound { slot, message });
            }
            Payload::Heartbeat => {
                debug!("Heartbeat from peer {}", slot);
                self.clients.touch(slot, Instant::now());
            }
            Payload::Disconnect => {
                info!("Peer {} requested disconnect", slot);
                self.disconnect_peer(slot);
                outcome.disconnected.push(slot);
            }
            Payload::ConnectRequest(request) => {
                if request.protocol_version != self.config.protocol_version {
                    warn!(
                        "Peer {} speaks protocol {}, host speaks {}",
                        slot, request.protocol_version, self.config.protocol_version
                    );
                }
                let reply = NetworkMessage::new(Payload::ConnectAccept(ConnectAccept {
                    peer_id: slot as u32,
                }));
                match reply {
                    Ok(reply) => {
                        if let Err(e) = self.send_to(slot, &reply) {
                            warn!("Could not answer connect request from peer {}: {}", slot, e);
                        }
                    }
                    Err(e) => error!("Failed to encode connect reply: {}", e),
                }
            }
            _ => debug!(
                "Ignoring {:?} message from peer {}",
                message.message_type(),
                slot
            ),
        }
    }

    fn send_bytes(&mut self, slot: usize, bytes: &[u8]) -> Result<bool, NetError> {
        let client = self
            .clients
            .get(slot)
            .ok_or(NetError::InvalidPeer(slot))?;

        match write_frame(&client.stream, bytes) {
            Ok(SendStatus::Sent) => Ok(true),
            Ok(SendStatus::WouldBlock) => {
                debug!("Peer {} would block, skipping message", slot);
                Ok(false)
            }
            Err(e) => {
                error!("Send to peer {} failed: {}", slot, e);
                self.disconnect_peer(slot);
                Err(NetError::SendFailed(e))
            }
        }
    }

    fn disconnect_peer(&mut self, slot: usize) -> bool {
        self.clients.remove_client(slot).is_some()
    }
}

fn poll_readiness(
    listener: &TcpListener,
    pending: &mut Option<(TcpStream, SocketAddr)>,
    clients: &ClientManager<TcpStream>,
    cx: &mut Context<'_>,
) -> Poll<Readiness> {
    let mut readiness = Readiness::default();

    if pending.is_some() {
        readiness.listener = true;
    } else {
        match listener.poll_accept(cx) {
            Poll::Ready(Ok(connection)) => {
                *pending = Some(connection);
                readiness.listener = true;
            }
            Poll::Ready(Err(e)) => error!("Listener error: {}", e),
            Poll::Pending => {}
        }
    }

    for client in clients.iter() {
        if client.stream.poll_read_ready(cx).is_ready() {
            readiness.peers.push(client.slot);
        }
    }

    if readiness.is_empty() {
        Poll::Pending
    } else {
        Poll::Ready(readiness)
    }
}

/// One non-blocking read, then every complete valid message it finished
fn read_messages(client: &mut Client<TcpStream>, scratch: &mut [u8]) -> ReadResult {
    match client.stream.try_read(scratch) {
        Ok(0) => return ReadResult::Closed,
        Ok(n) => client.frames.extend(&scratch[..n]),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            return ReadResult::Messages(Vec::new())
        }
        Err(e) => return ReadResult::Failed(e),
    }

    let mut messages = Vec::new();
    loop {
        let frame = match client.frames.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("Dropped unframeable bytes from peer {}: {}", client.slot, e);
                break;
            }
        };

        match codec::decode(&frame) {
            Ok(message) if validate(&message) => messages.push(message),
            Ok(_) => {}
            Err(e) => warn!("Discarding corrupt message from peer {}: {}", client.slot, e),
        }
    }
    ReadResult::Messages(messages)
}

fn write_frame(stream: &TcpStream, bytes: &[u8]) -> io::Result<SendStatus> {
    match stream.try_write(bytes) {
        Ok(n) if n == bytes.len() => Ok(SendStatus::Sent),
        // A partial frame would desynchronize the peer's reader
        Ok(n) => Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write: {} of {} bytes", n, bytes.len()),
        )),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(SendStatus::WouldBlock),
        Err(e) => Err(e),
    }
}

/// Bounded wait for write readiness; false if the socket did not become writable in time
async fn wait_writable(stream: &TcpStream, limit: Duration) -> bool {
    matches!(timeout(limit, stream.writable()).await, Ok(Ok(())))
}

async fn reject(mut stream: TcpStream, addr: SocketAddr, reason: RejectReason, limit: Duration) {
    info!("Rejecting connection from {}: {:?}", addr, reason);
    let message = NetworkMessage::new(Payload::ConnectReject(ConnectReject { reason }))
        .and_then(|message| codec::encode_to_vec(&message));
    match message {
        Ok(bytes) => {
            if !wait_writable(&stream, limit).await {
                debug!("Rejected connection from {} not writable", addr);
            }
            if let Err(e) = write_frame(&stream, &bytes) {
                debug!("Reject notice to {} not delivered: {}", addr, e);
            }
        }
        Err(e) => error!("Failed to encode reject notice: {}", e),
    }
    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown of rejected connection from {} failed: {}", addr, e);
    }
}
