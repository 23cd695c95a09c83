//! Routing of inbound frames to logical streams.

use muxplex_frame::{EventType, Frame, FrameError, Prefix};

use crate::config::{DuplicateConnection, EndpointConfig};
use crate::endpoint::{PendingAccept, State};
use crate::event::{EndpointEvent, FrameRejection};
use crate::proxy::StreamEvent;
use crate::registry::Direction;

impl State {
    /// Dispatch every complete frame the assembler holds.
    pub(crate) fn dispatch_pending(&mut self, config: &EndpointConfig) -> Result<(), FrameError> {
        while let Some(frame) = self.assembler.next_frame()? {
            self.dispatch(config, frame);
        }
        Ok(())
    }

    fn dispatch(&mut self, config: &EndpointConfig, frame: Frame) {
        let header = frame.header;
        let id = header.stream_id;
        tracing::trace!(
            stream_id = id,
            prefix = Prefix::name_of(header.prefix),
            event = EventType::name_of(header.event_type),
            len = header.length,
            "frame received"
        );

        let direction = Direction::from_prefix(header.prefix);
        match header.event() {
            Some(EventType::System) if header.prefix() == Some(Prefix::System) => {
                tracing::debug!(len = frame.payload.len(), "system message received");
                self.publish(EndpointEvent::SystemMessage(frame.payload));
            }
            Some(EventType::Connection) => self.accept_connection(config, direction, id, frame),
            Some(event @ (EventType::End | EventType::Error)) => {
                let Some(direction) = direction else {
                    return;
                };
                let observed = if event == EventType::End {
                    StreamEvent::End
                } else {
                    StreamEvent::Error
                };
                // The peer dropped its side before sending this, so nothing
                // goes back: an answer could only hit a stream reusing the id.
                self.terminate(direction, id, None, None, observed);
            }
            Some(EventType::Data) => {
                let slot = direction.and_then(|direction| self.registry.get(direction, id));
                match slot {
                    Some(slot) => {
                        if !frame.payload.is_empty() {
                            let _ = slot.events.send(StreamEvent::Data(frame.payload));
                        }
                    }
                    None => self.reject(FrameRejection::StreamNotFound {
                        prefix: header.prefix,
                        stream_id: id,
                        event_type: header.event_type,
                    }),
                }
            }
            Some(EventType::System) | None => self.reject(FrameRejection::IllegalEventType {
                prefix: header.prefix,
                stream_id: id,
                event_type: header.event_type,
            }),
        }
    }

    fn accept_connection(
        &mut self,
        config: &EndpointConfig,
        direction: Option<Direction>,
        id: u8,
        frame: Frame,
    ) {
        if let Some(direction) = direction {
            if self.registry.contains(direction, id) {
                if config.duplicate_connection == DuplicateConnection::Reject {
                    self.reject(FrameRejection::DuplicateStream { stream_id: id });
                    return;
                }
                tracing::debug!(stream_id = id, direction = ?direction, "connection replaces open stream");
                self.terminate(direction, id, None, None, StreamEvent::End);
            }
        }
        // The new stream always lives in the remote registry.
        if self.registry.contains(Direction::Remote, id) {
            self.terminate(Direction::Remote, id, None, None, StreamEvent::End);
        }

        let (serial, events) = self.open_slot(Direction::Remote, id);
        if !frame.payload.is_empty() {
            if let Some(slot) = self.registry.get(Direction::Remote, id) {
                let _ = slot.events.send(StreamEvent::Data(frame.payload));
            }
        }
        self.accepted.push_back(PendingAccept { id, serial, events });
    }

    fn reject(&mut self, rejection: FrameRejection) {
        tracing::warn!(reason = %rejection, "dropping frame");
        self.publish(EndpointEvent::Rejected(rejection));
    }
}
