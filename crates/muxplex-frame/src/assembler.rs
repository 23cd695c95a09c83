//! Frame reassembly.
//!
//! Transport reads arrive in arbitrary pieces: a header may be split across
//! two reads, one read may carry a dozen frames. [`FrameAssembler`] buffers
//! the bytes and hands back complete frames in wire order.
//!
//! ```
//! use muxplex_frame::{encode_frame, EventType, FrameAssembler, Prefix};
//! use bytes::BytesMut;
//!
//! let mut wire = BytesMut::new();
//! encode_frame(Prefix::Remote, 1, EventType::Data, b"abc", &mut wire).unwrap();
//!
//! let mut assembler = FrameAssembler::new();
//! assembler.extend(&wire[..4]);
//! assert!(assembler.next_frame().unwrap().is_none());
//! assembler.extend(&wire[4..]);
//! let frame = assembler.next_frame().unwrap().unwrap();
//! assert_eq!(frame.payload.as_ref(), b"abc");
//! ```

use bytes::{Buf, BytesMut};

use crate::codec::{Frame, FrameConfig, Header, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

#[derive(Debug, Clone, Copy)]
enum State {
    AwaitingHeader,
    AwaitingPayload(Header),
}

/// Incremental frame decoder.
#[derive(Debug)]
pub struct FrameAssembler {
    pending: BytesMut,
    state: State,
    config: FrameConfig,
}

impl FrameAssembler {
    /// Create an assembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create an assembler with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            pending: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: State::AwaitingHeader,
            config,
        }
    }

    /// Append transport bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Extract the next complete frame from the buffered bytes.
    ///
    /// Call in a loop until it returns `Ok(None)`; every complete frame in
    /// the buffer is returned before more input is needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut pending = std::mem::take(&mut self.pending);
        let result = self.decode_from(&mut pending);
        self.pending = pending;
        result
    }

    /// Extract the next complete frame from an external buffer.
    ///
    /// Consumed bytes are removed from `src`. A header that has been parsed
    /// but whose payload is still incomplete is remembered across calls, so
    /// the same buffer must be passed every time.
    pub fn decode_from(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::AwaitingHeader => {
                    if src.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let header = Header::decode(&src[..HEADER_SIZE])?;
                    let length = header.length as usize;
                    if length > self.config.max_payload_size {
                        return Err(FrameError::PayloadTooLarge {
                            size: length,
                            max: self.config.max_payload_size,
                        });
                    }

                    src.advance(HEADER_SIZE);
                    self.state = State::AwaitingPayload(header);
                }
                State::AwaitingPayload(header) => {
                    let length = header.length as usize;
                    if src.len() < length {
                        src.reserve(length - src.len());
                        return Ok(None);
                    }

                    let payload = src.split_to(length).freeze();
                    self.state = State::AwaitingHeader;
                    tracing::trace!(
                        stream_id = header.stream_id,
                        event = header.event_type,
                        len = length,
                        "frame reassembled"
                    );
                    return Ok(Some(Frame { header, payload }));
                }
            }
        }
    }

    /// Payload bytes the frame in progress still requires; 0 while waiting
    /// for a header.
    pub fn expected_length(&self) -> usize {
        match self.state {
            State::AwaitingHeader => 0,
            State::AwaitingPayload(header) => {
                (header.length as usize).saturating_sub(self.pending.len())
            }
        }
    }

    /// The header of the frame in progress, if one has been parsed.
    pub fn current_header(&self) -> Option<Header> {
        match self.state {
            State::AwaitingHeader => None,
            State::AwaitingPayload(header) => Some(header),
        }
    }

    /// Bytes buffered but not yet returned as part of a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::AwaitingHeader) && self.pending.is_empty()
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.state = State::AwaitingHeader;
    }

    /// Current configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
