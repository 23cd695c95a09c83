//! Multiplexed endpoint: many logical byte streams over one duplex transport.
//!
//! An [`Endpoint`] is one side of a connection. Locally opened streams take
//! an id from a FIFO pool of 256; streams opened by the peer arrive through
//! the acceptor installed with [`EndpointBuilder::on_stream`]. Each stream is
//! a [`StreamProxy`]: writes become frames on the endpoint's output, inbound
//! frames become [`StreamEvent`]s.
//!
//! ```
//! use muxplex_endpoint::{pump, Endpoint, StreamEvent};
//! use std::sync::{Arc, Mutex};
//!
//! let accepted = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&accepted);
//! let server = Endpoint::builder()
//!     .on_stream(move |stream| sink.lock().unwrap().push(stream))
//!     .build();
//! let client = Endpoint::new();
//!
//! let stream = client.create_stream().unwrap();
//! stream.write(b"hello").unwrap();
//! pump(&client, &server).unwrap();
//!
//! let remote = accepted.lock().unwrap().pop().unwrap();
//! assert_eq!(remote.try_recv(), Some(StreamEvent::Data("hello".into())));
//!
//! // Closing drops the acceptor and any proxies it kept.
//! client.close();
//! pump(&client, &server).unwrap();
//! assert!(server.is_closed());
//! ```

pub mod config;
mod dispatch;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod pool;
pub mod proxy;
pub mod registry;
pub mod transport;

pub use config::{DuplicateConnection, EndpointConfig, DEFAULT_MAX_PENDING_OUTPUT};
pub use endpoint::{Endpoint, EndpointBuilder};
pub use error::{MuxError, Result};
pub use event::{EndpointEvent, FrameRejection};
pub use pool::IdPool;
pub use proxy::{StreamEvent, StreamProxy};
pub use registry::Direction;
pub use transport::{attach, pump, Attachment, Transport};
