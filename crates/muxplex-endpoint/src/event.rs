//! Endpoint-level notifications.

use bytes::Bytes;
use muxplex_frame::{EventType, Prefix};

/// An inbound frame that was dropped instead of being dispatched.
///
/// Rejections never fail the endpoint; they are logged and published to
/// subscribers so callers can count or inspect them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameRejection {
    /// The event type is unknown, or `System` was used without the system prefix.
    #[error(
        "illegal event type {event_type:#04x} ({}) on stream {stream_id} with prefix {}",
        EventType::name_of(*event_type),
        Prefix::name_of(*prefix)
    )]
    IllegalEventType {
        prefix: u8,
        stream_id: u8,
        event_type: u8,
    },

    /// A data frame named a stream that is not open.
    #[error(
        "stream not found: id {stream_id}, event {} with prefix {}",
        EventType::name_of(*event_type),
        Prefix::name_of(*prefix)
    )]
    StreamNotFound {
        prefix: u8,
        stream_id: u8,
        event_type: u8,
    },

    /// A connection frame reused the id of an open stream while replacement
    /// is disabled.
    #[error("connection for stream {stream_id} which is already open")]
    DuplicateStream { stream_id: u8 },
}

/// Notification published to every [`crate::Endpoint::subscribe`] receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// Payload of a system frame sent by the peer.
    SystemMessage(Bytes),
    /// An inbound frame was dropped.
    Rejected(FrameRejection),
    /// The endpoint closed. Always the last event.
    Closed,
}
