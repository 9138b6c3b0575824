//! Wire protocol shared by the Tetris host and client.
//!
//! Defines the message layouts, the framing codec with its integrity token, the
//! validator that gates decoded messages, stream reassembly and the heartbeat
//! liveness policy. Both connection state machines build on these pieces.

pub mod codec;
pub mod config;
pub mod error;
pub mod framing;
pub mod liveness;
pub mod protocol;
pub mod validate;

pub use codec::{decode, encode, encode_to_vec, integrity_token, HEADER_SIZE};
pub use config::NetConfig;
pub use error::{CodecError, NetError};
pub use framing::FrameBuffer;
pub use liveness::{Liveness, LivenessPolicy};
pub use protocol::{
    Board, ConnectAccept, ConnectReject, ConnectRequest, GameEvent, GameStateSnapshot, Key,
    MessageHeader, MessageType, NetworkMessage, Payload, PlayerInputBatch, RejectReason,
};
pub use validate::validate;

pub const DEFAULT_PORT: u16 = 5555;
pub const MAX_PEERS: usize = 2;
pub const BUFFER_SIZE: usize = 1024;
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;
pub const PROTOCOL_VERSION: u32 = 1;

pub const BOARD_WIDTH: usize = 10;
pub const BOARD_HEIGHT: usize = 20;
pub const BOARD_CELLS: usize = BOARD_WIDTH * BOARD_HEIGHT;
pub const KEY_COUNT: usize = 9;

/// The game simulation as seen by the network layer.
///
/// The Host pulls a snapshot to broadcast and pushes decoded inputs in. Board
/// cell values are never interpreted here.
pub trait Simulation {
    fn snapshot(&self) -> GameStateSnapshot;

    fn apply_input(&mut self, peer: usize, input: &PlayerInputBatch);
}
