//! Semantic checks applied to decoded messages before they reach application code.

use log::warn;

use crate::codec::HEADER_SIZE;
use crate::protocol::{MessageType, NetworkMessage};

/// Returns `false` for messages that must be dropped.
///
/// Unknown tags and fixed-shape types shorter than their layout are rejected.
/// Heartbeat and Disconnect with extra bytes are accepted with a warning, and
/// types without a registered minimum pass through unchecked.
pub fn validate(message: &NetworkMessage) -> bool {
    let header = &message.header;
    let Some(kind) = header.message_type() else {
        warn!("Rejected message with unknown type tag {}", header.kind);
        return false;
    };

    let size = header.size as usize;
    if size < HEADER_SIZE {
        warn!("Rejected {:?} with size {} below header", kind, size);
        return false;
    }

    if kind.is_empty_body() {
        if size != HEADER_SIZE {
            warn!(
                "{:?} carries {} unexpected payload bytes",
                kind,
                size - HEADER_SIZE
            );
        }
        return true;
    }

    match kind.min_payload_size() {
        Some(minimum) if size < HEADER_SIZE + minimum => {
            warn!(
                "Rejected {:?}: size {} below required {}",
                kind,
                size,
                HEADER_SIZE + minimum
            );
            false
        }
        _ => true,
    }
}
