//! Many logical byte streams over one duplex transport.
//!
//! muxplex frames every chunk of every logical stream with a 7-byte header
//! and sends the frames over a single socket, pipe or in-memory channel.
//! Either side may open streams; up to 256 locally opened streams can be
//! live at once.
//!
//! # Crate Structure
//!
//! - [`frame`]: header codec and frame reassembly
//! - [`endpoint`]: endpoints, stream proxies and transport binding

/// Re-export frame types.
pub mod frame {
    pub use muxplex_frame::*;
}

/// Re-export endpoint types.
pub mod endpoint {
    pub use muxplex_endpoint::*;
}

pub use muxplex_endpoint::{Endpoint, MuxError, StreamEvent, StreamProxy};
