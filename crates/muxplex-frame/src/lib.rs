//! Frame codec for multiplexing logical byte streams over one duplex transport.
//!
//! Every chunk of logical-stream data travels in a frame with a fixed
//! 7-byte header:
//! - 1 byte prefix (which side of the stream the frame is destined for)
//! - 1 byte stream id (0-255)
//! - 1 byte event type (connection, data, end, error, system)
//! - 4 byte little-endian payload length
//!
//! [`FrameAssembler`] turns arbitrarily chunked transport bytes back into
//! complete frames. Nothing in this crate interprets the header values; that
//! is the endpoint's job.

pub mod assembler;
#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod wire;

pub use assembler::FrameAssembler;
#[cfg(feature = "async")]
pub use async_codec::MuxCodec;
pub use codec::{encode_frame, Frame, FrameConfig, Header, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use wire::{EventType, Prefix};
