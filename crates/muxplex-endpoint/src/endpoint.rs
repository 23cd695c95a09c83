use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use muxplex_frame::{encode_frame, EventType, FrameAssembler, Header, Prefix};

use crate::config::EndpointConfig;
use crate::error::{MuxError, Result};
use crate::event::EndpointEvent;
use crate::pool::IdPool;
use crate::proxy::{StreamEvent, StreamProxy};
use crate::registry::{Direction, Registry, StreamSlot};

type Acceptor = Box<dyn FnMut(StreamProxy) + Send>;

/// A remote stream created by the dispatcher, waiting to be handed to the
/// acceptor once the state lock is released.
#[derive(Debug)]
pub(crate) struct PendingAccept {
    pub(crate) id: u8,
    pub(crate) serial: u64,
    pub(crate) events: Receiver<StreamEvent>,
}

/// Mutable endpoint state, guarded by [`Shared::state`].
pub(crate) struct State {
    pub(crate) closed: bool,
    pub(crate) assembler: FrameAssembler,
    pub(crate) pool: IdPool,
    pub(crate) registry: Registry,
    pub(crate) outbound: BytesMut,
    pub(crate) next_serial: u64,
    pub(crate) subscribers: Vec<Sender<EndpointEvent>>,
    pub(crate) accepted: VecDeque<PendingAccept>,
}

impl State {
    fn new(config: &EndpointConfig) -> Self {
        Self {
            closed: false,
            assembler: FrameAssembler::with_config(config.frame.clone()),
            pool: IdPool::new(),
            registry: Registry::default(),
            outbound: BytesMut::new(),
            next_serial: 0,
            subscribers: Vec::new(),
            accepted: VecDeque::new(),
        }
    }

    /// Register a new stream slot and return its serial and event receiver.
    pub(crate) fn open_slot(&mut self, direction: Direction, id: u8) -> (u64, Receiver<StreamEvent>) {
        let (events, receiver) = mpsc::channel();
        let serial = self.next_serial;
        self.next_serial += 1;
        self.registry.insert(
            direction,
            id,
            StreamSlot {
                serial,
                events,
                first_packet_sent: false,
            },
        );
        tracing::debug!(stream_id = id, direction = ?direction, serial, "stream opened");
        (serial, receiver)
    }

    /// End one lifetime of a stream on this side.
    ///
    /// The consumer observes `observed`; `frame`, if any, is queued for the
    /// peer unless the endpoint is closed. Returns `false` if the stream was
    /// already gone.
    pub(crate) fn terminate(
        &mut self,
        direction: Direction,
        id: u8,
        serial: Option<u64>,
        frame: Option<EventType>,
        observed: StreamEvent,
    ) -> bool {
        let Some(slot) = self.registry.remove(direction, id, serial) else {
            return false;
        };
        if direction == Direction::Local {
            self.pool.release(id);
        }
        if let Some(event) = frame {
            if !self.closed {
                Header::new(direction.outbound_prefix(), id, event, 0).encode(&mut self.outbound);
            }
        }
        tracing::debug!(stream_id = id, direction = ?direction, outcome = ?observed, "stream ended");
        let _ = slot.events.send(observed);
        true
    }

    pub(crate) fn publish(&mut self, event: EndpointEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn output_finished(&self) -> bool {
        self.closed && self.outbound.is_empty()
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    pub(crate) signal: Condvar,
    acceptor: Mutex<Option<Acceptor>>,
    pub(crate) config: EndpointConfig,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait_writable(&self, timeout: Duration) -> bool {
        let limit = self.config.max_pending_output;
        let state = self.lock();
        let (_state, result) = self
            .signal
            .wait_timeout_while(state, timeout, |state| {
                state.outbound.len() >= limit && !state.closed
            })
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    /// Hand every queued remote stream to the acceptor, in arrival order,
    /// and drop the acceptor once the endpoint is closed.
    ///
    /// Runs without the state lock held so the acceptor may call back into
    /// the endpoint. Concurrent callers leave the draining to whoever holds
    /// the acceptor; that caller re-checks the queue after letting go.
    pub(crate) fn deliver_accepted(self: &Arc<Self>) {
        loop {
            {
                let mut acceptor = match self.acceptor.try_lock() {
                    Ok(guard) => guard,
                    Err(TryLockError::WouldBlock) => return,
                    Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                };
                loop {
                    let next = self.lock().accepted.pop_front();
                    let Some(pending) = next else {
                        break;
                    };
                    let proxy = StreamProxy::new(
                        Arc::clone(self),
                        pending.id,
                        Direction::Remote,
                        pending.serial,
                        pending.events,
                    );
                    match acceptor.as_mut() {
                        Some(accept) => accept(proxy),
                        None => {
                            tracing::debug!(stream_id = pending.id, "no acceptor installed, ending stream");
                            drop(proxy);
                        }
                    }
                }
                // Proxies the acceptor keeps hold the endpoint alive; let
                // them go once it is closed.
                let closed = self.lock().closed;
                if closed {
                    if let Some(accept) = acceptor.take() {
                        drop(accept);
                        tracing::debug!("acceptor released");
                    }
                }
            }
            let idle = self.lock().accepted.is_empty();
            if idle {
                return;
            }
        }
    }
}

/// One side of a multiplexed connection.
///
/// An endpoint turns inbound transport bytes ([`Endpoint::feed`]) into
/// events on logical streams, and collects the frames its streams write into
/// an outgoing buffer the transport drains ([`Endpoint::next_output`]).
/// Handles are cheap to clone and all clones share the same state.
#[derive(Clone)]
pub struct Endpoint {
    shared: Arc<Shared>,
}

impl Endpoint {
    /// An endpoint with default configuration and no acceptor.
    ///
    /// Streams opened by the peer are ended immediately.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::default()
    }

    /// Open a locally-initiated stream with the next free id.
    pub fn create_stream(&self) -> Result<StreamProxy> {
        let (id, serial, events) = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(MuxError::Closed);
            }
            let id = state.pool.allocate()?;
            let (serial, events) = state.open_slot(Direction::Local, id);
            (id, serial, events)
        };
        Ok(StreamProxy::new(
            Arc::clone(&self.shared),
            id,
            Direction::Local,
            serial,
            events,
        ))
    }

    /// Open a locally-initiated stream with an explicit id.
    pub fn create_stream_with_id(&self, id: u8) -> Result<StreamProxy> {
        let (serial, events) = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(MuxError::Closed);
            }
            if state.registry.contains(Direction::Local, id) {
                return Err(MuxError::StreamInUse(id));
            }
            state.pool.take(id);
            state.open_slot(Direction::Local, id)
        };
        Ok(StreamProxy::new(
            Arc::clone(&self.shared),
            id,
            Direction::Local,
            serial,
            events,
        ))
    }

    /// Queue a system frame for the peer. Does nothing once closed.
    pub fn send_system_message(&self, data: &[u8]) -> Result<()> {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return Ok(());
            }
            encode_frame(Prefix::System, 0, EventType::System, data, &mut state.outbound)?;
        }
        tracing::info!(len = data.len(), "sending system message");
        self.shared.signal.notify_all();
        Ok(())
    }

    /// Close the endpoint. Idempotent.
    ///
    /// Every open stream ends (consumers observe `End`), no further frames
    /// are queued, and once already-queued output is drained the output side
    /// reports end-of-stream.
    pub fn close(&self) {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.accepted.clear();
            let mut ended = 0usize;
            for (direction, id, slot) in state.registry.drain() {
                if direction == Direction::Local {
                    state.pool.release(id);
                }
                let _ = slot.events.send(StreamEvent::End);
                ended += 1;
            }
            state.publish(EndpointEvent::Closed);
            tracing::info!(streams_ended = ended, "endpoint closed");
        }
        self.shared.signal.notify_all();
        self.shared.deliver_accepted();
    }

    /// Feed bytes received from the transport.
    ///
    /// Frames may be split or batched arbitrarily. Frames that cannot be
    /// dispatched are reported to subscribers and skipped; a framing error
    /// closes the endpoint and is returned. Input after close is discarded.
    pub fn feed(&self, data: &[u8]) -> Result<()> {
        let result = {
            let mut state = self.shared.lock();
            if state.closed {
                tracing::trace!(len = data.len(), "discarding input after close");
                return Ok(());
            }
            state.assembler.extend(data);
            state.dispatch_pending(&self.shared.config)
        };
        self.shared.signal.notify_all();
        self.shared.deliver_accepted();

        if let Err(err) = result {
            tracing::warn!(error = %err, "unrecoverable framing error, closing endpoint");
            self.close();
            return Err(err.into());
        }
        Ok(())
    }

    /// The transport will deliver no more input.
    pub fn finish_input(&self) {
        {
            let state = self.shared.lock();
            if !state.closed && !state.assembler.is_idle() {
                tracing::debug!(
                    pending = state.assembler.pending_len(),
                    "input ended inside a frame"
                );
            }
        }
        self.close();
    }

    /// Take everything queued for the transport without blocking.
    pub fn take_output(&self) -> Option<Bytes> {
        let chunk = {
            let mut state = self.shared.lock();
            if state.outbound.is_empty() {
                return None;
            }
            state.outbound.split().freeze()
        };
        self.shared.signal.notify_all();
        Some(chunk)
    }

    /// Wait for output. `None` means the endpoint closed and every queued
    /// byte has been taken.
    pub fn next_output(&self) -> Option<Bytes> {
        let chunk = {
            let state = self.shared.lock();
            let mut state = self
                .shared
                .signal
                .wait_while(state, |state| state.outbound.is_empty() && !state.closed)
                .unwrap_or_else(PoisonError::into_inner);
            if state.outbound.is_empty() {
                return None;
            }
            state.outbound.split().freeze()
        };
        self.shared.signal.notify_all();
        Some(chunk)
    }

    /// Bytes queued for the transport.
    pub fn pending_output(&self) -> usize {
        self.shared.lock().outbound.len()
    }

    /// Block until stream writes would be accepted again, or the endpoint
    /// closes. Returns `false` on timeout.
    pub fn wait_writable(&self, timeout: Duration) -> bool {
        self.shared.wait_writable(timeout)
    }

    /// Receive endpoint notifications. Each receiver sees every event
    /// published after it subscribed.
    pub fn subscribe(&self) -> Receiver<EndpointEvent> {
        let (tx, rx) = mpsc::channel();
        let mut state = self.shared.lock();
        if state.closed {
            let _ = tx.send(EndpointEvent::Closed);
        } else {
            state.subscribers.push(tx);
        }
        rx
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// True once the endpoint is closed and its output fully taken.
    pub fn is_output_finished(&self) -> bool {
        self.shared.lock().output_finished()
    }

    /// Open streams as `(local, remote)`.
    pub fn open_streams(&self) -> (usize, usize) {
        let state = self.shared.lock();
        (
            state.registry.len(Direction::Local),
            state.registry.len(Direction::Remote),
        )
    }

    /// Local stream ids still available.
    pub fn available_ids(&self) -> usize {
        self.shared.lock().pool.len()
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.shared.config
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Endpoint")
            .field("closed", &state.closed)
            .field("local_streams", &state.registry.len(Direction::Local))
            .field("remote_streams", &state.registry.len(Direction::Remote))
            .field("pending_output", &state.outbound.len())
            .finish()
    }
}

/// Transport-facing input: bytes written here are fed to the endpoint.
impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.feed(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Transport-facing output: blocks until frames are queued, returns 0 once
/// the endpoint is closed and drained.
impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let read = {
            let state = self.shared.lock();
            let mut state = self
                .shared
                .signal
                .wait_while(state, |state| state.outbound.is_empty() && !state.closed)
                .unwrap_or_else(PoisonError::into_inner);
            let n = buf.len().min(state.outbound.len());
            buf[..n].copy_from_slice(&state.outbound[..n]);
            state.outbound.advance(n);
            n
        };
        self.shared.signal.notify_all();
        Ok(read)
    }
}

/// Builds an [`Endpoint`].
#[derive(Default)]
pub struct EndpointBuilder {
    config: EndpointConfig,
    acceptor: Option<Acceptor>,
}

impl EndpointBuilder {
    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    /// Callback invoked with every stream the peer opens, in arrival order.
    ///
    /// The callback runs on the thread that fed the connection frame, after
    /// the endpoint has released its internal lock.
    ///
    /// Every [`StreamProxy`] refers back to its endpoint, so a callback that
    /// stores proxies keeps the endpoint alive. The callback is dropped when
    /// the endpoint closes, which releases them; an endpoint that is never
    /// closed is never freed while such proxies exist.
    pub fn on_stream<F>(mut self, accept: F) -> Self
    where
        F: FnMut(StreamProxy) + Send + 'static,
    {
        self.acceptor = Some(Box::new(accept));
        self
    }

    pub fn build(self) -> Endpoint {
        let state = State::new(&self.config);
        Endpoint {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                signal: Condvar::new(),
                acceptor: Mutex::new(self.acceptor),
                config: self.config,
            }),
        }
    }
}

impl fmt::Debug for EndpointBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("config", &self.config)
            .field("acceptor", &self.acceptor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use muxplex_frame::{FrameReader, HEADER_SIZE};

    use super::*;

    fn frames_of(bytes: &[u8]) -> Vec<muxplex_frame::Frame> {
        FrameReader::new(bytes)
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn first_local_write_is_connection() {
        let endpoint = Endpoint::new();
        let stream = endpoint.create_stream().unwrap();
        stream.write(b"1").unwrap();
        stream.write(b"2").unwrap();

        let output = endpoint.take_output().unwrap();
        let frames = frames_of(&output);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].header, Header::new(Prefix::Remote, 0, EventType::Connection, 1));
        assert_eq!(frames[1].header, Header::new(Prefix::Remote, 0, EventType::Data, 1));
        assert!(endpoint.take_output().is_none());
    }

    #[test]
    fn system_message_frame() {
        let endpoint = Endpoint::new();
        endpoint.send_system_message(b"hello").unwrap();

        let output = endpoint.take_output().unwrap();
        assert_eq!(&output[..HEADER_SIZE], &[0xCC, 0, 0x10, 5, 0, 0, 0]);
        assert_eq!(&output[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn explicit_id_conflicts() {
        let endpoint = Endpoint::new();
        let stream = endpoint.create_stream_with_id(42).unwrap();
        assert_eq!(stream.id(), 42);
        assert_eq!(endpoint.available_ids(), 255);
        assert!(matches!(
            endpoint.create_stream_with_id(42),
            Err(MuxError::StreamInUse(42))
        ));

        stream.end();
        assert_eq!(endpoint.available_ids(), 256);
        assert!(endpoint.create_stream_with_id(42).is_ok());
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let endpoint = Endpoint::new();
        let events = endpoint.subscribe();
        let stream = endpoint.create_stream().unwrap();
        stream.write(b"queued").unwrap();

        endpoint.close();
        endpoint.close();

        assert!(endpoint.is_closed());
        assert_eq!(stream.recv(), Some(StreamEvent::End));
        assert!(matches!(endpoint.create_stream(), Err(MuxError::Closed)));
        assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![EndpointEvent::Closed]);

        // Output queued before close is still delivered, then the output ends.
        assert!(!endpoint.is_output_finished());
        assert!(endpoint.next_output().is_some());
        assert!(endpoint.next_output().is_none());
        assert!(endpoint.is_output_finished());
    }

    #[test]
    fn writes_after_close_are_ignored() {
        let endpoint = Endpoint::new();
        let stream = endpoint.create_stream().unwrap();
        endpoint.close();

        stream.write(b"late").unwrap();
        endpoint.send_system_message(b"late").unwrap();
        stream.end();

        assert_eq!(endpoint.pending_output(), 0);
        assert!(endpoint.next_output().is_none());
    }

    #[test]
    fn subscribe_after_close_sees_closed() {
        let endpoint = Endpoint::new();
        endpoint.close();
        let events = endpoint.subscribe();
        assert_eq!(events.recv().unwrap(), EndpointEvent::Closed);
    }

    #[test]
    fn io_read_drains_output() {
        let mut endpoint = Endpoint::new();
        endpoint.send_system_message(b"abc").unwrap();
        endpoint.close();

        let mut out = Vec::new();
        endpoint.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), HEADER_SIZE + 3);
    }

    #[test]
    fn oversized_frame_closes_endpoint() {
        let config = EndpointConfig::default().with_frame_config(muxplex_frame::FrameConfig {
            max_payload_size: 8,
        });
        let endpoint = Endpoint::builder().config(config).build();

        let err = endpoint.feed(&[0xBB, 0, 0, 64, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, MuxError::Frame(_)));
        assert!(endpoint.is_closed());

        // Later input is discarded rather than failing again.
        assert!(endpoint.feed(&[0xBB, 0, 0, 64, 0, 0, 0]).is_ok());
    }

    #[test]
    fn close_releases_streams_held_by_acceptor() {
        let mut kept = Vec::new();
        let endpoint = Endpoint::builder()
            .on_stream(move |stream| kept.push(stream))
            .build();
        endpoint.feed(&[0xBB, 4, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(endpoint.open_streams(), (0, 1));

        let shared = Arc::downgrade(&endpoint.shared);
        endpoint.close();
        drop(endpoint);
        assert!(shared.upgrade().is_none());
    }

    #[test]
    fn acceptor_may_close_its_endpoint() {
        let (tx, rx) = mpsc::channel::<Endpoint>();
        let endpoint = Endpoint::builder()
            .on_stream(move |stream| {
                if let Ok(endpoint) = rx.try_recv() {
                    endpoint.close();
                }
                drop(stream);
            })
            .build();
        tx.send(endpoint.clone()).unwrap();

        endpoint.feed(&[0xBB, 1, 0, 0, 0, 0, 0]).unwrap();
        assert!(endpoint.is_closed());

        let shared = Arc::downgrade(&endpoint.shared);
        drop(endpoint);
        assert!(shared.upgrade().is_none());
    }

    #[test]
    fn wait_writable_times_out_under_backpressure() {
        let config = EndpointConfig::default().with_max_pending_output(4);
        let endpoint = Endpoint::builder().config(config).build();
        let stream = endpoint.create_stream().unwrap();

        stream.write(b"fill").unwrap();
        assert!(!endpoint.wait_writable(Duration::from_millis(10)));

        endpoint.take_output();
        assert!(endpoint.wait_writable(Duration::from_millis(10)));
    }
}
