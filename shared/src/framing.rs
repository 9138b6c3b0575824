//! Stream reassembly.
//!
//! TCP delivers a byte stream, so one receive may hold several messages or only
//! part of one. [`FrameBuffer`] accumulates received bytes and cuts complete
//! frames using the size field of each header.

use log::warn;

use crate::codec::{self, HEADER_SIZE};
use crate::error::CodecError;

/// Per-connection receive accumulator
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
    max_frame: usize,
}

impl FrameBuffer {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_frame),
            max_frame,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete frame, if one is buffered.
    ///
    /// A header declaring fewer than 10 or more than `max_frame` bytes leaves the
    /// stream unrecoverable; the buffer is discarded and the error returned.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = codec::read_header(&self.buffer)?;
        let size = header.size as usize;

        if size < HEADER_SIZE {
            warn!(
                "Discarding {} buffered bytes: frame size {} below header",
                self.buffer.len(),
                size
            );
            self.buffer.clear();
            return Err(CodecError::InvalidSize {
                size: header.size,
                header: HEADER_SIZE,
            });
        }
        if size > self.max_frame {
            warn!(
                "Discarding {} buffered bytes: frame size {} over limit",
                self.buffer.len(),
                size
            );
            self.buffer.clear();
            return Err(CodecError::Oversized {
                size: header.size,
                max: self.max_frame,
            });
        }

        if self.buffer.len() < size {
            return Ok(None);
        }

        let rest = self.buffer.split_off(size);
        Ok(Some(std::mem::replace(&mut self.buffer, rest)))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
