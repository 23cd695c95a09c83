use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::wire::{EventType, Prefix};

/// Frame header: prefix (1) + stream id (1) + event type (1) + length (4) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Default maximum payload size accepted by the reassembler: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A decoded frame header.
///
/// Fields hold the raw wire bytes; decoding never validates them so that the
/// dispatcher can report (rather than lose) frames with unknown tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub prefix: u8,
    pub stream_id: u8,
    pub event_type: u8,
    /// Exact payload byte count following the header.
    pub length: u32,
}

impl Header {
    /// Build a header from typed wire tags.
    pub fn new(prefix: Prefix, stream_id: u8, event: EventType, length: u32) -> Self {
        Self {
            prefix: prefix.as_byte(),
            stream_id,
            event_type: event.as_byte(),
            length,
        }
    }

    /// The prefix, if it is one of the recognised values.
    pub fn prefix(&self) -> Option<Prefix> {
        Prefix::try_from(self.prefix).ok()
    }

    /// The event type, if it is one of the recognised values.
    pub fn event(&self) -> Option<EventType> {
        EventType::try_from(self.event_type).ok()
    }

    /// Write the 7 header bytes.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u8(self.prefix);
        dst.put_u8(self.stream_id);
        dst.put_u8(self.event_type);
        dst.put_u32_le(self.length);
    }

    /// Decode a header from the first 7 bytes of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::IncompleteHeader { len: src.len() });
        }
        Ok(Self {
            prefix: src[0],
            stream_id: src[1],
            event_type: src[2],
            length: u32::from_le_bytes([src[3], src[4], src[5], src[6]]),
        })
    }
}

/// A complete frame: header plus exactly `header.length` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, deriving the header length from the payload.
    ///
    /// Fails with [`FrameError::PayloadTooLarge`] if the payload is longer
    /// than a `u32` length field can describe.
    pub fn new(
        prefix: Prefix,
        stream_id: u8,
        event: EventType,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        let length = wire_length(payload.len())?;
        Ok(Self {
            header: Header::new(prefix, stream_id, event, length),
            payload,
        })
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬───────────┬────────────┬────────────┬────────────────┐
/// │ Prefix   │ Stream id │ Event type │ Length     │ Payload        │
/// │ (1B)     │ (1B)      │ (1B)       │ (4B LE)    │ (Length bytes) │
/// └──────────┴───────────┴────────────┴────────────┴────────────────┘
/// ```
pub fn encode_frame(
    prefix: Prefix,
    stream_id: u8,
    event: EventType,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let length = wire_length(payload.len())?;
    dst.reserve(HEADER_SIZE + payload.len());
    Header::new(prefix, stream_id, event, length).encode(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Payload length as carried in the header.
fn wire_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

/// Configuration for frame decoding.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload a header may announce. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
