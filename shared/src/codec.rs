//! Message encoding and decoding with integrity checking.
//!
//! Frame format (all integers big-endian):
//!
//! ```text
//! [size: u32][type: u32][integrity_token: u16][payload: size - 10 bytes]
//! ```
//!
//! Payload bodies are fixed-width big-endian records serialized with bincode.

use bincode::Options;
use serde::de::DeserializeOwned;

use crate::error::CodecError;
use crate::protocol::{MessageHeader, MessageType, NetworkMessage, Payload};

pub const HEADER_SIZE: usize = 10;

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// 16-bit rolling XOR over the payload.
///
/// Bytes at even offsets land in the high byte, odd offsets in the low byte.
/// Any single flipped bit changes the token; two flips of the same bit at
/// offsets of equal parity cancel out and go unnoticed.
pub fn integrity_token(payload: &[u8]) -> u16 {
    let mut token: u16 = 0;
    let mut groups = payload.chunks_exact(4);

    for group in groups.by_ref() {
        token ^= u16::from(group[0]) << 8;
        token ^= u16::from(group[1]);
        token ^= u16::from(group[2]) << 8;
        token ^= u16::from(group[3]);
    }

    let offset = payload.len() - groups.remainder().len();
    for (i, &byte) in groups.remainder().iter().enumerate() {
        if (offset + i) % 2 == 0 {
            token ^= u16::from(byte) << 8;
        } else {
            token ^= u16::from(byte);
        }
    }

    token
}

/// Serializes a payload body without header
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, CodecError> {
    let options = wire_options();
    let body = match payload {
        Payload::ConnectRequest(body) => options.serialize(body)?,
        Payload::ConnectAccept(body) => options.serialize(body)?,
        Payload::ConnectReject(body) => options.serialize(body)?,
        Payload::GameState(body) => options.serialize(body)?,
        Payload::PlayerInput(body) => options.serialize(body)?,
        Payload::GameEvent(body) => options.serialize(body)?,
        Payload::Heartbeat | Payload::Disconnect => Vec::new(),
        Payload::Raw(bytes) => bytes.clone(),
    };
    Ok(body)
}

fn typed<T, F>(bytes: &[u8], wrap: F) -> Payload
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Payload,
{
    match wire_options().deserialize::<T>(bytes) {
        Ok(body) => wrap(body),
        Err(_) => Payload::Raw(bytes.to_vec()),
    }
}

/// Selects the payload variant for `kind`, falling back to raw bytes
pub fn decode_payload(kind: u32, bytes: &[u8]) -> Payload {
    match MessageType::from_tag(kind) {
        Some(MessageType::ConnectRequest) => typed(bytes, Payload::ConnectRequest),
        Some(MessageType::ConnectAccept) => typed(bytes, Payload::ConnectAccept),
        Some(MessageType::ConnectReject) => typed(bytes, Payload::ConnectReject),
        Some(MessageType::GameState) => typed(bytes, Payload::GameState),
        Some(MessageType::PlayerInput) => typed(bytes, Payload::PlayerInput),
        Some(MessageType::GameEvent) => typed(bytes, Payload::GameEvent),
        Some(MessageType::Heartbeat) => Payload::Heartbeat,
        Some(MessageType::Disconnect) => Payload::Disconnect,
        None => Payload::Raw(bytes.to_vec()),
    }
}

/// Parses the fixed header without checking the payload
pub fn read_header(buffer: &[u8]) -> Result<MessageHeader, CodecError> {
    if buffer.len() < HEADER_SIZE {
        return Err(CodecError::TruncatedHeader {
            required: HEADER_SIZE,
            available: buffer.len(),
        });
    }

    Ok(MessageHeader {
        size: u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]),
        kind: u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]),
        integrity_token: u16::from_be_bytes([buffer[8], buffer[9]]),
    })
}

/// Writes `message` into `buffer`, returning the number of bytes used.
///
/// The header's `size` is authoritative: the serialized payload is truncated or
/// zero-padded to `size - 10` bytes, and the token is recomputed over exactly
/// those bytes.
pub fn encode(message: &NetworkMessage, buffer: &mut [u8]) -> Result<usize, CodecError> {
    let size = message.header.size as usize;
    if size < HEADER_SIZE {
        return Err(CodecError::InvalidSize {
            size: message.header.size,
            header: HEADER_SIZE,
        });
    }
    if buffer.len() < size {
        return Err(CodecError::BufferTooSmall {
            required: size,
            available: buffer.len(),
        });
    }

    let body = encode_payload(&message.payload)?;
    let payload = &mut buffer[HEADER_SIZE..size];
    let copied = body.len().min(payload.len());
    payload[..copied].copy_from_slice(&body[..copied]);
    payload[copied..].fill(0);
    let token = integrity_token(payload);

    buffer[0..4].copy_from_slice(&message.header.size.to_be_bytes());
    buffer[4..8].copy_from_slice(&message.header.kind.to_be_bytes());
    buffer[8..10].copy_from_slice(&token.to_be_bytes());

    Ok(size)
}

/// Encodes into a freshly allocated buffer of exactly `header.size` bytes
pub fn encode_to_vec(message: &NetworkMessage) -> Result<Vec<u8>, CodecError> {
    let mut buffer = vec![0u8; (message.header.size as usize).max(HEADER_SIZE)];
    let written = encode(message, &mut buffer)?;
    buffer.truncate(written);
    Ok(buffer)
}

/// Decodes one message from the start of `buffer`; trailing bytes are ignored
pub fn decode(buffer: &[u8]) -> Result<NetworkMessage, CodecError> {
    let header = read_header(buffer)?;
    let size = header.size as usize;

    if size < HEADER_SIZE {
        return Err(CodecError::InvalidSize {
            size: header.size,
            header: HEADER_SIZE,
        });
    }
    if buffer.len() < size {
        return Err(CodecError::TruncatedPayload {
            declared: size,
            available: buffer.len(),
        });
    }

    let payload = &buffer[HEADER_SIZE..size];
    let actual = integrity_token(payload);
    if actual != header.integrity_token {
        return Err(CodecError::IntegrityMismatch {
            expected: header.integrity_token,
            actual,
        });
    }

    Ok(NetworkMessage {
        header,
        payload: decode_payload(header.kind, payload),
    })
}
