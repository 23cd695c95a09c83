//! Wire tags carried in every frame header.
//!
//! The prefix names the registry a frame is destined for on the receiving
//! endpoint; the event type names what the frame means for that stream.

/// Prefix byte: which side of a logical stream a frame targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Prefix {
    /// Destined for the receiver's locally-initiated streams.
    Local = 0xAA,
    /// Destined for the receiver's remotely-initiated streams.
    Remote = 0xBB,
    /// Out-of-band endpoint-to-endpoint signalling.
    System = 0xCC,
}

impl Prefix {
    /// Wire value of this prefix.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// The prefix a stream of this direction stamps on outgoing frames.
    ///
    /// A locally-initiated stream is a remote stream on the peer, and the
    /// other way round. `System` maps to itself.
    pub fn opposite(self) -> Self {
        match self {
            Prefix::Local => Prefix::Remote,
            Prefix::Remote => Prefix::Local,
            Prefix::System => Prefix::System,
        }
    }

    /// Human-readable name, `"UNKNOWN"` for unrecognised bytes.
    pub fn name_of(byte: u8) -> &'static str {
        match Prefix::try_from(byte) {
            Ok(Prefix::Local) => "LOCAL",
            Ok(Prefix::Remote) => "REMOTE",
            Ok(Prefix::System) => "SYSTEM",
            Err(_) => "UNKNOWN",
        }
    }
}

impl TryFrom<u8> for Prefix {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0xAA => Ok(Prefix::Local),
            0xBB => Ok(Prefix::Remote),
            0xCC => Ok(Prefix::System),
            other => Err(other),
        }
    }
}

/// Event type byte: the meaning of a frame for its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    /// First frame of a locally-initiated stream; carries its first chunk.
    Connection = 0,
    /// A chunk of stream data.
    Data = 1,
    /// Orderly end of a stream.
    End = 2,
    /// The stream was torn down because of an error.
    Error = 3,
    /// System message, only meaningful with [`Prefix::System`].
    System = 0x10,
}

impl EventType {
    /// Wire value of this event type.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Human-readable name, `"UNKNOWN"` for unrecognised bytes.
    pub fn name_of(byte: u8) -> &'static str {
        match EventType::try_from(byte) {
            Ok(EventType::Connection) => "CONNECTION",
            Ok(EventType::Data) => "DATA",
            Ok(EventType::End) => "END",
            Ok(EventType::Error) => "ERROR",
            Ok(EventType::System) => "SYSTEM",
            Err(_) => "UNKNOWN",
        }
    }
}

impl TryFrom<u8> for EventType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(EventType::Connection),
            1 => Ok(EventType::Data),
            2 => Ok(EventType::End),
            3 => Ok(EventType::Error),
            0x10 => Ok(EventType::System),
            other => Err(other),
        }
    }
}
