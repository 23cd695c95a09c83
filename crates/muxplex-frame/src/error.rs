/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer than `HEADER_SIZE` bytes were supplied to the header decoder.
    #[error("incomplete frame header ({len} bytes, need 7)")]
    IncompleteHeader { len: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A frame's header announces a different length than its payload has.
    #[error("header announces {announced} payload bytes, frame carries {actual}")]
    LengthMismatch { announced: u32, actual: usize },

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input ended in the middle of a frame.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
