//! `tokio_util::codec` adapter for use with `Framed`, `FramedRead` and
//! `FramedWrite`.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::assembler::FrameAssembler;
use crate::codec::{Frame, FrameConfig, HEADER_SIZE};
use crate::error::FrameError;

/// Frame codec for async transports.
#[derive(Debug, Default)]
pub struct MuxCodec {
    assembler: FrameAssembler,
}

impl MuxCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            assembler: FrameAssembler::with_config(config),
        }
    }
}

impl Decoder for MuxCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        self.assembler.decode_from(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() && self.assembler.current_header().is_none() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for MuxCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        if frame.payload.len() != frame.header.length as usize {
            return Err(FrameError::LengthMismatch {
                announced: frame.header.length,
                actual: frame.payload.len(),
            });
        }
        dst.reserve(HEADER_SIZE + frame.payload.len());
        frame.header.encode(dst);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
