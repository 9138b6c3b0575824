//! Client side of a session: one outbound connection to the host.
//!
//! Like the host, the client never blocks its caller for longer than a short
//! readiness wait. Would-block outcomes surface as `Ok(None)` or `Ok(false)`,
//! never as errors.

use log::{debug, error, info, warn};
use shared::{
    codec, validate, ConnectRequest, FrameBuffer, Liveness, LivenessPolicy, NetConfig,
    NetError, NetworkMessage, Payload,
};
use std::io;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

enum SendStatus {
    Sent,
    WouldBlock,
}

pub struct ClientContext {
    config: NetConfig,
    state: ClientState,
    stream: Option<TcpStream>,
    remote: Option<SocketAddr>,
    /// Assigned by the host's ConnectAccept; `None` until then
    peer_id: Option<u32>,
    last_heartbeat: Instant,
    frames: FrameBuffer,
    policy: LivenessPolicy,
    scratch: Vec<u8>,
}

impl ClientContext {
    pub fn new(config: NetConfig) -> Self {
        Self {
            state: ClientState::Disconnected,
            stream: None,
            remote: None,
            peer_id: None,
            last_heartbeat: Instant::now(),
            frames: FrameBuffer::new(config.recv_buffer_size),
            policy: LivenessPolicy::new(config.heartbeat_interval),
            scratch: vec![0u8; config.recv_buffer_size],
            config,
        }
    }

    /// Opens the connection, bounded by the configured connect timeout
    ///
    /// Unlike every other operation this may wait up to `connect_timeout`, so
    /// call it before entering the tick loop. The state reads `Connecting` only
    /// while the attempt is in flight. An existing session is torn down first.
    pub async fn connect(&mut self, address: &str, port: u16) -> Result<(), NetError> {
        if self.stream.is_some() {
            self.disconnect().await;
        }

        self.state = ClientState::Connecting;
        let target = format!("{}:{}", address, port);
        info!("Connecting to {}", target);

        let attempt = timeout(self.config.connect_timeout, TcpStream::connect((address, port)));
        let stream = match attempt.await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.reset();
                error!("Connection to {} failed: {}", target, e);
                return Err(NetError::ConnectFailed {
                    addr: target,
                    source: e,
                });
            }
            Err(_) => {
                self.reset();
                error!("Connection to {} timed out", target);
                return Err(NetError::ConnectFailed {
                    addr: target,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        self.remote = stream.peer_addr().ok();
        self.stream = Some(stream);
        self.frames.clear();
        self.peer_id = None;
        self.last_heartbeat = Instant::now();
        self.state = ClientState::Connected;
        info!("Connected to {}", target);
        Ok(())
    }

    /// Writes one message; `Ok(false)` means it was dropped because the socket would block
    pub fn send(&mut self, message: &NetworkMessage) -> Result<bool, NetError> {
        let stream = self.connected_stream()?;
        let bytes = codec::encode_to_vec(message)?;

        match write_frame(stream, &bytes) {
            Ok(SendStatus::Sent) => Ok(true),
            Ok(SendStatus::WouldBlock) => {
                debug!("Send would block, dropping {:?}", message.message_type());
                Ok(false)
            }
            Err(e) => {
                error!("Send failed: {}", e);
                Err(NetError::SendFailed(e))
            }
        }
    }

    /// Asks the host to (re)send this client's peer id
    pub fn request_peer_id(&mut self) -> Result<bool, NetError> {
        let request = NetworkMessage::new(Payload::ConnectRequest(ConnectRequest {
            protocol_version: self.config.protocol_version,
        }))?;
        self.send(&request)
    }

    /// Returns the next message from the host, if one is ready
    ///
    /// At most one readiness wait and one read happen per call. Handshake
    /// replies are absorbed here and not returned. A closed or failed socket
    /// resets the session and fails with `Disconnected`.
    pub async fn receive(&mut self) -> Result<Option<NetworkMessage>, NetError> {
        self.connected_stream()?;
        if let Some(message) = self.next_buffered()? {
            return Ok(Some(message));
        }

        let poll_timeout = self.config.client_poll_timeout;
        let ready = {
            let stream = self.connected_stream()?;
            timeout(poll_timeout, stream.readable()).await
        };
        match ready {
            Err(_) => return Ok(None),
            Ok(Err(e)) => return Err(self.lost(e)),
            Ok(Ok(())) => {}
        }

        let read = match self.stream.as_ref() {
            Some(stream) => stream.try_read(&mut self.scratch),
            None => return Err(NetError::NotConnected),
        };
        match read {
            Ok(0) => {
                info!("Host closed the connection");
                self.reset();
                return Err(NetError::Disconnected);
            }
            Ok(n) => self.frames.extend(&self.scratch[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(self.lost(e)),
        }

        self.next_buffered()
    }

    pub fn check_liveness(&mut self) -> Result<Liveness, NetError> {
        self.check_liveness_at(Instant::now())
    }

    /// Sends a heartbeat after two silent intervals; fails with `Timeout` after three
    pub fn check_liveness_at(&mut self, now: Instant) -> Result<Liveness, NetError> {
        self.connected_stream()?;
        let liveness = self.policy.assess(self.last_heartbeat, now);

        match liveness {
            Liveness::Expired => {
                let elapsed = now.saturating_duration_since(self.last_heartbeat);
                warn!("No heartbeat for {:?}, session lost", elapsed);
                return Err(NetError::Timeout { elapsed });
            }
            Liveness::Probe => {
                // A dropped heartbeat still counts; the next probe comes two intervals later
                self.send(&NetworkMessage::heartbeat())?;
                self.last_heartbeat = now;
                debug!("Heartbeat sent");
            }
            Liveness::Healthy => {}
        }
        Ok(liveness)
    }

    /// Best-effort goodbye, then teardown. Never fails.
    pub async fn disconnect(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            self.reset();
            return;
        };
        self.state = ClientState::Disconnecting;

        match codec::encode_to_vec(&NetworkMessage::disconnect()) {
            Ok(bytes) => {
                if let Err(e) = write_frame(&stream, &bytes) {
                    debug!("Disconnect notice not delivered: {}", e);
                }
            }
            Err(e) => error!("Failed to encode disconnect notice: {}", e),
        }
        if let Err(e) = stream.shutdown().await {
            debug!("Socket shutdown failed: {}", e);
        }

        self.reset();
        info!("Disconnected from host");
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    pub fn peer_id(&self) -> Option<u32> {
        self.peer_id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    fn connected_stream(&self) -> Result<&TcpStream, NetError> {
        match (&self.state, &self.stream) {
            (ClientState::Connected, Some(stream)) => Ok(stream),
            _ => Err(NetError::NotConnected),
        }
    }

    /// Cuts, checks and routes buffered frames until one is worth returning
    fn next_buffered(&mut self) -> Result<Option<NetworkMessage>, NetError> {
        loop {
            let frame = match self.frames.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!("Dropped unframeable bytes from host: {}", e);
                    return Ok(None);
                }
            };

            let message = match codec::decode(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Discarding corrupt message from host: {}", e);
                    continue;
                }
            };
            if !validate(&message) {
                continue;
            }

            match &message.payload {
                Payload::ConnectAccept(accept) => {
                    info!("Host assigned peer id {}", accept.peer_id);
                    self.peer_id = Some(accept.peer_id);
                }
                Payload::ConnectReject(reject) => {
                    warn!("Host rejected the connection: {:?}", reject.reason);
                    self.reset();
                    return Err(NetError::Rejected(reject.reason));
                }
                Payload::Heartbeat => {
                    self.last_heartbeat = Instant::now();
                    return Ok(Some(message));
                }
                _ => return Ok(Some(message)),
            }
        }
    }

    fn lost(&mut self, e: io::Error) -> NetError {
        warn!("Connection to host lost: {}", e);
        self.reset();
        NetError::Disconnected
    }

    fn reset(&mut self) {
        self.stream = None;
        self.remote = None;
        self.peer_id = None;
        self.frames.clear();
        self.state = ClientState::Disconnected;
    }
}

fn write_frame(stream: &TcpStream, bytes: &[u8]) -> io::Result<SendStatus> {
    match stream.try_write(bytes) {
        Ok(n) if n == bytes.len() => Ok(SendStatus::Sent),
        // A partial frame would desynchronize the host's reader
        Ok(n) => Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write: {} of {} bytes", n, bytes.len()),
        )),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(SendStatus::WouldBlock),
        Err(e) => Err(e),
    }
}
