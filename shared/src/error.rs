//! Error types for the wire protocol and both connection roles.
//!
//! Transient conditions (would-block, no data yet) are never represented here;
//! they surface as empty results (`Ok(None)`, `Ok(0)`) from the state machines.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::RejectReason;

/// Failures while framing or unframing a single message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Output buffer cannot hold the declared message size
    #[error("buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// Fewer bytes than a header were supplied
    #[error("truncated header: need {required} bytes, got {available}")]
    TruncatedHeader { required: usize, available: usize },

    /// The header declares more bytes than were supplied
    #[error("truncated payload: header declares {declared} bytes, got {available}")]
    TruncatedPayload { declared: usize, available: usize },

    /// Declared size is smaller than the header itself
    #[error("declared size {size} is smaller than the {header} byte header")]
    InvalidSize { size: u32, header: usize },

    /// Declared size exceeds what a single receive can hold
    #[error("declared size {size} exceeds the {max} byte frame limit")]
    Oversized { size: u32, max: usize },

    /// Recomputed token over the payload differs from the header's token
    #[error("integrity mismatch: header token {expected:#06x}, computed {actual:#06x}")]
    IntegrityMismatch { expected: u16, actual: u16 },

    /// Payload body could not be serialized
    #[error("payload serialization failed: {0}")]
    Payload(#[from] bincode::Error),
}

/// Failures surfaced by the Host and Client connection state machines.
#[derive(Debug, Error)]
pub enum NetError {
    /// Bind, listen or socket creation failed; fatal to session start
    #[error("network initialization failed: {0}")]
    InitFailed(#[source] io::Error),

    /// Every peer slot is occupied
    #[error("all {capacity} peer slots are occupied")]
    CapacityExceeded { capacity: usize },

    /// The listening socket reported a hard accept error
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// A broadcast reached no peer because every send hard-failed
    #[error("broadcast failed for all {attempted} connected peers")]
    AllSendsFailed { attempted: usize },

    /// Slot id out of range or not connected
    #[error("peer slot {0} is not connected")]
    InvalidPeer(usize),

    /// A send failed for a reason other than would-block
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    /// Outbound connection could not be established
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The remote side closed the connection or the read failed
    #[error("connection lost")]
    Disconnected,

    /// No heartbeat within the liveness window
    #[error("no heartbeat for {elapsed:?}, session considered lost")]
    Timeout { elapsed: Duration },

    /// The host turned this client away
    #[error("connection rejected by host: {0:?}")]
    Rejected(RejectReason),

    /// Operation requires an established connection
    #[error("not connected")]
    NotConnected,

    /// The session has been torn down; no further operations are valid
    #[error("session has been shut down")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),
}
