use std::fmt;
use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes};
use muxplex_frame::{encode_frame, EventType};

use crate::endpoint::Shared;
use crate::error::{MuxError, Result};
use crate::registry::Direction;

/// What the readable side of a stream observes, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of stream data.
    Data(Bytes),
    /// The stream ended.
    End,
    /// The stream was torn down with an error.
    Error,
}

/// Handle to one logical stream.
///
/// Writes become frames on the endpoint's output; inbound frames for the
/// stream arrive as [`StreamEvent`]s. Dropping the handle ends the stream.
pub struct StreamProxy {
    shared: Arc<Shared>,
    id: u8,
    direction: Direction,
    serial: u64,
    events: Receiver<StreamEvent>,
    leftover: Bytes,
    finished: bool,
}

impl StreamProxy {
    pub(crate) fn new(
        shared: Arc<Shared>,
        id: u8,
        direction: Direction,
        serial: u64,
        events: Receiver<StreamEvent>,
    ) -> Self {
        Self {
            shared,
            id,
            direction,
            serial,
            events,
            leftover: Bytes::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True until the stream is ended from either side or the endpoint closes.
    pub fn is_open(&self) -> bool {
        self.shared
            .lock()
            .registry
            .get(self.direction, self.id)
            .is_some_and(|slot| slot.serial == self.serial)
    }

    /// Send one chunk to the peer.
    ///
    /// Silently ignored once the stream has ended or the endpoint closed.
    /// Fails with [`MuxError::Backpressure`] while the endpoint's outgoing
    /// buffer is at its limit.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.send_chunk(data)
    }

    fn send_chunk(&self, data: &[u8]) -> Result<()> {
        let limit = self.shared.config.max_pending_output;
        {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            if state.closed {
                return Ok(());
            }
            let Some(slot) = state
                .registry
                .get_mut(self.direction, self.id)
                .filter(|slot| slot.serial == self.serial)
            else {
                return Ok(());
            };

            let pending = state.outbound.len();
            if pending >= limit {
                return Err(MuxError::Backpressure { pending, limit });
            }

            let event = if self.direction == Direction::Local && !slot.first_packet_sent {
                EventType::Connection
            } else {
                EventType::Data
            };
            encode_frame(
                self.direction.outbound_prefix(),
                self.id,
                event,
                data,
                &mut state.outbound,
            )?;
            slot.first_packet_sent = true;
            tracing::trace!(stream_id = self.id, event = ?event, len = data.len(), "frame queued");
        }
        self.shared.signal.notify_all();
        Ok(())
    }

    /// Block until a write would not hit backpressure, or the endpoint
    /// closes. Returns `false` on timeout.
    pub fn wait_writable(&self, timeout: Duration) -> bool {
        self.shared.wait_writable(timeout)
    }

    /// End the stream. Idempotent.
    pub fn end(&self) {
        self.finish(EventType::End, StreamEvent::End);
    }

    /// Tear the stream down with an error. Idempotent.
    pub fn error(&self) {
        self.finish(EventType::Error, StreamEvent::Error);
    }

    fn finish(&self, frame: EventType, observed: StreamEvent) {
        let ended = self.shared.lock().terminate(
            self.direction,
            self.id,
            Some(self.serial),
            Some(frame),
            observed,
        );
        if ended {
            self.shared.signal.notify_all();
        }
    }

    /// Wait for the next event. `None` once the stream is over and every
    /// event has been received.
    pub fn recv(&self) -> Option<StreamEvent> {
        self.events.recv().ok()
    }

    /// Next event if one is queued.
    pub fn try_recv(&self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// `Disconnected` means the stream is over and every event was received.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<StreamEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }
}

impl Drop for StreamProxy {
    fn drop(&mut self) {
        self.end();
    }
}

impl fmt::Debug for StreamProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamProxy")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("serial", &self.serial)
            .finish()
    }
}

/// Reads stream data; returns 0 after the stream ends or errors.
impl Read for StreamProxy {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.leftover.is_empty() {
            if self.finished {
                return Ok(0);
            }
            match self.events.recv() {
                Ok(StreamEvent::Data(data)) => self.leftover = data,
                Ok(StreamEvent::End) | Ok(StreamEvent::Error) | Err(_) => self.finished = true,
            }
        }
        let n = buf.len().min(self.leftover.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.advance(n);
        Ok(n)
    }
}

/// Each call sends one frame; backpressure surfaces as `WouldBlock`.
impl Write for StreamProxy {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send_chunk(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use muxplex_frame::{FrameReader, Header, Prefix};

    use super::*;
    use crate::{Endpoint, EndpointConfig};

    fn headers(endpoint: &Endpoint) -> Vec<Header> {
        let output = endpoint.take_output().unwrap_or_default();
        FrameReader::new(output.as_ref())
            .map(|frame| frame.unwrap().header)
            .collect()
    }

    #[test]
    fn end_is_idempotent() {
        let endpoint = Endpoint::new();
        let stream = endpoint.create_stream().unwrap();
        assert!(stream.is_open());

        stream.end();
        stream.end();
        drop(stream);

        assert_eq!(
            headers(&endpoint),
            vec![Header::new(Prefix::Remote, 0, EventType::End, 0)]
        );
        assert_eq!(endpoint.available_ids(), 256);
    }

    #[test]
    fn error_sends_error_frame() {
        let endpoint = Endpoint::new();
        let stream = endpoint.create_stream().unwrap();
        stream.error();

        assert_eq!(stream.recv(), Some(StreamEvent::Error));
        assert_eq!(stream.recv(), None);
        assert!(!stream.is_open());
        assert_eq!(
            headers(&endpoint),
            vec![Header::new(Prefix::Remote, 0, EventType::Error, 0)]
        );
    }

    #[test]
    fn writes_after_end_are_ignored() {
        let endpoint = Endpoint::new();
        let stream = endpoint.create_stream().unwrap();
        stream.end();
        endpoint.take_output();

        stream.write(b"late").unwrap();
        assert_eq!(endpoint.pending_output(), 0);
    }

    #[test]
    fn stale_handle_cannot_touch_reused_id() {
        let endpoint = Endpoint::new();
        let old = endpoint.create_stream_with_id(9).unwrap();
        old.end();
        let new = endpoint.create_stream_with_id(9).unwrap();
        endpoint.take_output();

        old.write(b"stale").unwrap();
        old.end();
        assert_eq!(endpoint.pending_output(), 0);
        assert!(new.is_open());
    }

    #[test]
    fn backpressure_rejects_then_recovers() {
        let config = EndpointConfig::default().with_max_pending_output(16);
        let endpoint = Endpoint::builder().config(config).build();
        let mut stream = endpoint.create_stream().unwrap();

        stream.write(&[0u8; 32]).unwrap();
        assert!(matches!(
            stream.write(b"more"),
            Err(MuxError::Backpressure { pending: 39, limit: 16 })
        ));
        let err = Write::write(&mut stream, b"more").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        endpoint.take_output();
        stream.write(b"more").unwrap();
    }

    #[test]
    fn io_read_stops_at_end() {
        let endpoint = Endpoint::new();
        let mut stream = endpoint.create_stream().unwrap();
        stream.end();

        let mut buf = Vec::new();
        assert_eq!(stream.read_to_end(&mut buf).unwrap(), 0);
    }
}
