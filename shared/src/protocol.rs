//! Message types and payload layouts exchanged between Host and Client.
//!
//! Every message is a fixed 10-byte header followed by a type-dependent payload.
//! The header's `kind` field selects exactly one [`Payload`] variant; Heartbeat and
//! Disconnect carry no payload at all.

use serde::{Deserialize, Serialize};

use crate::codec::{self, HEADER_SIZE};
use crate::error::CodecError;
use crate::{BOARD_HEIGHT, BOARD_WIDTH, KEY_COUNT};

/// Stable numeric message tags. Tag 0 is reserved and never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    ConnectRequest = 1,
    ConnectAccept = 2,
    ConnectReject = 3,
    GameState = 4,
    PlayerInput = 5,
    Heartbeat = 6,
    Disconnect = 7,
    GameEvent = 8,
}

impl MessageType {
    pub const INVALID_TAG: u32 = 0;

    pub const ALL: [MessageType; 8] = [
        MessageType::ConnectRequest,
        MessageType::ConnectAccept,
        MessageType::ConnectReject,
        MessageType::GameState,
        MessageType::PlayerInput,
        MessageType::Heartbeat,
        MessageType::Disconnect,
        MessageType::GameEvent,
    ];

    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Minimum payload length this type requires, if it has a fixed shape.
    ///
    /// `None` means the core does not size-check the type: Game events are opaque
    /// to the protocol layer and may grow in later revisions.
    pub fn min_payload_size(self) -> Option<usize> {
        match self {
            MessageType::ConnectRequest => Some(ConnectRequest::WIRE_SIZE),
            MessageType::ConnectAccept => Some(ConnectAccept::WIRE_SIZE),
            MessageType::ConnectReject => Some(ConnectReject::WIRE_SIZE),
            MessageType::GameState => Some(GameStateSnapshot::WIRE_SIZE),
            MessageType::PlayerInput => Some(PlayerInputBatch::WIRE_SIZE),
            MessageType::Heartbeat | MessageType::Disconnect => Some(0),
            MessageType::GameEvent => None,
        }
    }

    /// True for types that never carry a payload
    pub fn is_empty_body(self) -> bool {
        matches!(self, MessageType::Heartbeat | MessageType::Disconnect)
    }
}

/// Fixed-size message header as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total bytes including this header
    pub size: u32,
    /// Raw type tag; may be outside [`MessageType`] for foreign or corrupt input
    pub kind: u32,
    pub integrity_token: u16,
}

impl MessageHeader {
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_tag(self.kind)
    }

    pub fn payload_len(&self) -> usize {
        (self.size as usize).saturating_sub(HEADER_SIZE)
    }
}

/// Board rows, top to bottom; one byte per cell, 0 = empty
pub type Board = [[u8; BOARD_WIDTH]; BOARD_HEIGHT];

/// Authoritative game state pushed from Host to Clients
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub elapsed_time: f32,
    pub score: i32,
    pub board: Board,
    pub next_piece: u32,
}

impl GameStateSnapshot {
    pub const WIRE_SIZE: usize = 4 + 4 + BOARD_WIDTH * BOARD_HEIGHT + 4;

    /// Row-major iterator over every board cell
    pub fn cells(&self) -> impl Iterator<Item = u8> + '_ {
        self.board.iter().flat_map(|row| row.iter().copied())
    }
}

/// Input keys in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    MoveLeft,
    MoveRight,
    RotateCw,
    RotateCcw,
    SoftDrop,
    HardDrop,
    Hold,
    Pause,
    Quit,
}

impl Key {
    pub const ALL: [Key; KEY_COUNT] = [
        Key::MoveLeft,
        Key::MoveRight,
        Key::RotateCw,
        Key::RotateCcw,
        Key::SoftDrop,
        Key::HardDrop,
        Key::Hold,
        Key::Pause,
        Key::Quit,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Snapshot of currently pressed keys sent from Client to Host.
///
/// `timestamp` is advisory; the Host does not reorder or buffer on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerInputBatch {
    pub keys: [u8; KEY_COUNT],
    pub timestamp: f32,
}

impl PlayerInputBatch {
    pub const WIRE_SIZE: usize = KEY_COUNT + 4;

    pub fn new(timestamp: f32) -> Self {
        Self {
            keys: [0; KEY_COUNT],
            timestamp,
        }
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.set(key, true);
        self
    }

    pub fn set(&mut self, key: Key, pressed: bool) {
        self.keys[key.index()] = u8::from(pressed);
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.keys[key.index()] != 0
    }

    pub fn pressed(&self) -> impl Iterator<Item = Key> + '_ {
        Key::ALL.into_iter().filter(move |key| self.is_pressed(*key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub protocol_version: u32,
}

impl ConnectRequest {
    pub const WIRE_SIZE: usize = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAccept {
    pub peer_id: u32,
}

impl ConnectAccept {
    pub const WIRE_SIZE: usize = 4;
}

/// Why the Host turned a connection away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    ServerFull,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReject {
    pub reason: RejectReason,
}

impl ConnectReject {
    pub const WIRE_SIZE: usize = 4;
}

/// Simulation-defined event; neither field is interpreted by the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    pub code: u32,
    pub value: i32,
}

/// The active payload variant of a message
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    ConnectRequest(ConnectRequest),
    ConnectAccept(ConnectAccept),
    ConnectReject(ConnectReject),
    GameState(GameStateSnapshot),
    PlayerInput(PlayerInputBatch),
    Heartbeat,
    Disconnect,
    GameEvent(GameEvent),
    /// Payload bytes of an unrecognized tag, or too short for the tag's layout
    Raw(Vec<u8>),
}

impl Payload {
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Payload::ConnectRequest(_) => Some(MessageType::ConnectRequest),
            Payload::ConnectAccept(_) => Some(MessageType::ConnectAccept),
            Payload::ConnectReject(_) => Some(MessageType::ConnectReject),
            Payload::GameState(_) => Some(MessageType::GameState),
            Payload::PlayerInput(_) => Some(MessageType::PlayerInput),
            Payload::Heartbeat => Some(MessageType::Heartbeat),
            Payload::Disconnect => Some(MessageType::Disconnect),
            Payload::GameEvent(_) => Some(MessageType::GameEvent),
            Payload::Raw(_) => None,
        }
    }
}

/// A header plus exactly one payload variant
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMessage {
    pub header: MessageHeader,
    pub payload: Payload,
}

impl NetworkMessage {
    /// Builds a message whose header size and token match the payload
    pub fn new(payload: Payload) -> Result<Self, CodecError> {
        let kind = payload
            .message_type()
            .map(MessageType::tag)
            .unwrap_or(MessageType::INVALID_TAG);
        Self::with_kind(kind, payload)
    }

    /// Builds a message carrying an arbitrary tag, e.g. for a raw payload
    pub fn with_kind(kind: u32, payload: Payload) -> Result<Self, CodecError> {
        let body = codec::encode_payload(&payload)?;
        Ok(Self {
            header: MessageHeader {
                size: (HEADER_SIZE + body.len()) as u32,
                kind,
                integrity_token: codec::integrity_token(&body),
            },
            payload,
        })
    }

    pub fn heartbeat() -> Self {
        Self::empty(MessageType::Heartbeat, Payload::Heartbeat)
    }

    pub fn disconnect() -> Self {
        Self::empty(MessageType::Disconnect, Payload::Disconnect)
    }

    pub fn game_state(snapshot: GameStateSnapshot) -> Result<Self, CodecError> {
        Self::new(Payload::GameState(snapshot))
    }

    pub fn player_input(input: PlayerInputBatch) -> Result<Self, CodecError> {
        Self::new(Payload::PlayerInput(input))
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type()
    }

    fn empty(kind: MessageType, payload: Payload) -> Self {
        Self {
            header: MessageHeader {
                size: HEADER_SIZE as u32,
                kind: kind.tag(),
                integrity_token: 0,
            },
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(MessageType::ConnectRequest.tag(), 1);
        assert_eq!(MessageType::ConnectAccept.tag(), 2);
        assert_eq!(MessageType::ConnectReject.tag(), 3);
        assert_eq!(MessageType::GameState.tag(), 4);
        assert_eq!(MessageType::PlayerInput.tag(), 5);
        assert_eq!(MessageType::Heartbeat.tag(), 6);
        assert_eq!(MessageType::Disconnect.tag(), 7);
        assert_eq!(MessageType::GameEvent.tag(), 8);
    }

    #[test]
    fn test_from_tag_rejects_outside_enumeration() {
        assert_eq!(MessageType::from_tag(0), None);
        assert_eq!(MessageType::from_tag(9), None);
        assert_eq!(MessageType::from_tag(u32::MAX), None);
        for kind in MessageType::ALL {
            assert_eq!(MessageType::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn test_header_sizes_follow_payload() {
        let heartbeat = NetworkMessage::heartbeat();
        assert_eq!(heartbeat.header.size as usize, HEADER_SIZE);
        assert_eq!(heartbeat.header.payload_len(), 0);

        let state = NetworkMessage::game_state(GameStateSnapshot::default()).unwrap();
        assert_eq!(
            state.header.size as usize,
            HEADER_SIZE + GameStateSnapshot::WIRE_SIZE
        );

        let input = NetworkMessage::player_input(PlayerInputBatch::new(0.5)).unwrap();
        assert_eq!(
            input.header.size as usize,
            HEADER_SIZE + PlayerInputBatch::WIRE_SIZE
        );
        assert_eq!(input.message_type(), Some(MessageType::PlayerInput));
    }

    #[test]
    fn test_input_batch_keys() {
        let mut batch = PlayerInputBatch::new(1.0).with_key(Key::MoveLeft);
        batch.set(Key::HardDrop, true);

        assert!(batch.is_pressed(Key::MoveLeft));
        assert!(batch.is_pressed(Key::HardDrop));
        assert!(!batch.is_pressed(Key::MoveRight));
        assert_eq!(
            batch.pressed().collect::<Vec<_>>(),
            vec![Key::MoveLeft, Key::HardDrop]
        );

        batch.set(Key::MoveLeft, false);
        assert_eq!(batch.keys[Key::MoveLeft.index()], 0);
    }

    #[test]
    fn test_snapshot_cells_are_row_major() {
        let mut snapshot = GameStateSnapshot::default();
        snapshot.board[0][1] = 3;
        snapshot.board[1][0] = 7;

        let cells: Vec<u8> = snapshot.cells().collect();
        assert_eq!(cells.len(), BOARD_WIDTH * BOARD_HEIGHT);
        assert_eq!(cells[1], 3);
        assert_eq!(cells[BOARD_WIDTH], 7);
    }

    #[test]
    fn test_raw_payload_keeps_given_tag() {
        let message = NetworkMessage::with_kind(42, Payload::Raw(vec![1, 2, 3])).unwrap();
        assert_eq!(message.header.kind, 42);
        assert_eq!(message.header.size as usize, HEADER_SIZE + 3);
        assert_eq!(message.message_type(), None);
    }
}
