use std::io;

/// Errors that can occur in endpoint and stream operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// All 256 local stream ids are in use.
    #[error("maximum number of streams is 256")]
    PoolExhausted,

    /// A local stream with this id is already open.
    #[error("stream {0} is already open")]
    StreamInUse(u8),

    /// The endpoint has been closed.
    #[error("endpoint closed")]
    Closed,

    /// The outgoing buffer is full; wait for the transport to drain it.
    #[error("outgoing buffer full ({pending} bytes pending, limit {limit})")]
    Backpressure { pending: usize, limit: usize },

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] muxplex_frame::FrameError),

    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<MuxError> for io::Error {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::Io(io) => io,
            MuxError::Backpressure { .. } => io::Error::new(io::ErrorKind::WouldBlock, err),
            MuxError::Closed => io::Error::new(io::ErrorKind::BrokenPipe, err),
            MuxError::Frame(_) => io::Error::new(io::ErrorKind::InvalidData, err),
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
