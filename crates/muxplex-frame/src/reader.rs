use std::io::{ErrorKind, Read};

use crate::assembler::FrameAssembler;
use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Blocking frame source over any [`Read`] implementation.
///
/// Short reads are absorbed by an internal [`FrameAssembler`], so every
/// frame returned is whole no matter how the bytes trickled in.
pub struct FrameReader<T> {
    inner: T,
    assembler: FrameAssembler,
}

impl<T: Read> FrameReader<T> {
    /// Frame reader with the default 16 MiB payload limit.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            assembler: FrameAssembler::with_config(config),
        }
    }

    /// Block until the next frame is complete.
    ///
    /// Returns `Ok(None)` when the stream ends on a frame boundary and
    /// `Err(FrameError::ConnectionClosed)` when it ends inside a frame.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = self.assembler.next_frame()? {
                return Ok(Some(frame));
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.assembler.is_idle() {
                    return Ok(None);
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.assembler.extend(&chunk[..read]);
        }
    }

    /// Bytes read from the stream but not yet returned in a frame.
    pub fn buffered(&self) -> usize {
        self.assembler.pending_len()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Give back the source. Bytes already buffered are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        self.assembler.config()
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}
