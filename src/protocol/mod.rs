//! Protocol layer for the messaging hub
//!
//! This module provides:
//! - Length-prefixed frame encoding/decoding
//! - Wire event definitions (inbound and outbound)

pub mod events;
pub mod frame;

// Re-export commonly used types
pub use events::{ClientEvent, ErrorPayload, ServerEvent};
pub use frame::{encode_frame, FrameCodec, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
