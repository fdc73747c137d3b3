//! Length-prefixed framing for the control stream
//!
//! Frame format:
//! ```text
//! +----------------+------------------+
//! | length         | body             |
//! | (4 bytes, BE)  | (JSON event)     |
//! +----------------+------------------+
//! ```
//!
//! The event `type` discriminator lives inside the JSON body (see
//! [`super::events`]), so the frame layer only delimits message boundaries.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{self, Cursor};

/// Frame header size: 4-byte big-endian body length
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum frame body size (1 MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Encode a frame body into a wire-ready buffer
pub fn encode_frame(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    buf.freeze()
}

/// Streaming frame decoder
///
/// Feed raw bytes as they arrive from the transport; complete frame bodies
/// come back out in order.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Feed data into the codec
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame body
    ///
    /// Returns `Ok(Some(body))` if a complete frame is buffered, `Ok(None)`
    /// if more data is needed.
    pub fn decode_next(&mut self) -> io::Result<Option<Bytes>> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the length without consuming
        let mut cursor = Cursor::new(&self.buffer[..]);
        let body_len = cursor.get_u32() as usize;

        if body_len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame body too large: {} bytes (max: {})",
                    body_len, MAX_FRAME_SIZE
                ),
            ));
        }

        let total_size = FRAME_HEADER_SIZE + body_len;
        if self.buffer.len() < total_size {
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_SIZE);
        Ok(Some(self.buffer.split_to(body_len).freeze()))
    }

    /// Get the current buffer length
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
