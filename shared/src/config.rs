//! Network configuration consumed by both roles.

use std::time::Duration;

use crate::{BUFFER_SIZE, DEFAULT_PORT, HEARTBEAT_INTERVAL_MS, MAX_PEERS, PROTOCOL_VERSION};

/// Tunables for a Host or Client session
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Address the Host binds to
    pub bind_host: String,
    /// Listening port (Host) or remote port (Client)
    pub port: u16,
    /// Fixed number of peer slots on the Host
    pub max_peers: usize,
    /// Size of one receive; also the largest frame accepted
    pub recv_buffer_size: usize,
    pub heartbeat_interval: Duration,
    /// Upper bound on the Host's per-tick readiness wait
    pub host_poll_timeout: Duration,
    /// Upper bound on the Client's per-receive readiness wait
    pub client_poll_timeout: Duration,
    pub connect_timeout: Duration,
    pub protocol_version: u32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_peers: MAX_PEERS,
            recv_buffer_size: BUFFER_SIZE,
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            host_poll_timeout: Duration::from_millis(10),
            client_poll_timeout: Duration::from_millis(5),
            connect_timeout: Duration::from_millis(5000),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

impl NetConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}
