use muxplex_frame::FrameConfig;

/// Default limit for bytes queued for the transport: 4 MiB.
pub const DEFAULT_MAX_PENDING_OUTPUT: usize = 4 * 1024 * 1024;

/// What to do with a connection frame for a stream id that is already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateConnection {
    /// End the open stream and accept the new one.
    #[default]
    Replace,
    /// Keep the open stream and drop the frame.
    Reject,
}

/// Endpoint behavior configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Limits applied to inbound frames.
    pub frame: FrameConfig,
    /// Stream writes fail with `Backpressure` while at least this many bytes
    /// wait to be taken by the transport.
    pub max_pending_output: usize,
    /// Policy for a connection frame naming an open stream.
    pub duplicate_connection: DuplicateConnection,
}

impl EndpointConfig {
    /// Override the inbound frame limits.
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    /// Override the outgoing buffer limit.
    pub fn with_max_pending_output(mut self, limit: usize) -> Self {
        self.max_pending_output = limit;
        self
    }

    /// Override the duplicate connection policy.
    pub fn with_duplicate_connection(mut self, policy: DuplicateConnection) -> Self {
        self.duplicate_connection = policy;
        self
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            max_pending_output: DEFAULT_MAX_PENDING_OUTPUT,
            duplicate_connection: DuplicateConnection::default(),
        }
    }
}
