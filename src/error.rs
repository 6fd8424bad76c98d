//! Error types
//!
//! Channel faults carry the failing operation and channel name so a single
//! diagnostic line identifies what broke.

use std::fmt;
use std::io;

use crate::channel::ChannelName;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug)]
pub enum Error {
    /// Invalid configuration, detected before any channel is opened
    Config(ConfigError),
    /// Channel operation failed
    Channel(ChannelError),
    /// Runtime or signal setup failure
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e),
            Error::Channel(e) => write!(f, "{}", e),
            Error::Io(e) => write!(f, "io: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Channel(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Error::Channel(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Channel name is not a valid POSIX queue name
    InvalidName(String),
    /// The same channel name appears twice
    DuplicateName(String),
    /// No channels configured
    NoChannels,
    /// Queue depth must be at least one
    ZeroCapacity,
    /// Message size must be at least one byte
    ZeroMessageSize,
    /// A configured value exceeds what the host allows
    ExceedsHostLimit {
        setting: &'static str,
        requested: u64,
        limit: u64,
    },
    /// A producer payload does not match the configured message size
    PayloadSize {
        channel: String,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidName(name) => write!(f, "invalid channel name: {:?}", name),
            ConfigError::DuplicateName(name) => write!(f, "duplicate channel name: {}", name),
            ConfigError::NoChannels => write!(f, "no channels configured"),
            ConfigError::ZeroCapacity => write!(f, "max messages must be at least 1"),
            ConfigError::ZeroMessageSize => write!(f, "message size must be at least 1 byte"),
            ConfigError::ExceedsHostLimit {
                setting,
                requested,
                limit,
            } => write!(
                f,
                "{} = {} exceeds host limit {} (see /proc/sys/fs/mqueue)",
                setting, requested, limit
            ),
            ConfigError::PayloadSize {
                channel,
                expected,
                actual,
            } => write!(
                f,
                "payload for {} is {} bytes, channel message size is {}",
                channel, actual, expected
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Channel operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOp {
    Open,
    Send,
    Receive,
    Close,
    Remove,
}

impl fmt::Display for ChannelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelOp::Open => "open",
            ChannelOp::Send => "send",
            ChannelOp::Receive => "receive",
            ChannelOp::Close => "close",
            ChannelOp::Remove => "remove",
        };
        f.write_str(s)
    }
}

/// Cause of a channel failure
#[derive(Debug)]
pub enum ChannelErrorKind {
    /// The OS call failed
    Os(io::Error),
    /// Frame length differs from the channel's message size
    SizeMismatch { expected: usize, actual: usize },
    /// An existing queue was attached but its attributes differ
    AttributeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Operation on a handle that has been closed
    Closed,
    /// Second close of the same handle
    AlreadyClosed,
    /// No channel with this name exists
    NotFound,
    /// Name cannot be passed to the OS
    InvalidName,
}

impl fmt::Display for ChannelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelErrorKind::Os(e) => write!(f, "{}", e),
            ChannelErrorKind::SizeMismatch { expected, actual } => {
                write!(f, "frame is {} bytes, expected {}", actual, expected)
            }
            ChannelErrorKind::AttributeMismatch { expected, actual } => write!(
                f,
                "existing queue has max_messages={} message_size={}, expected max_messages={} message_size={}",
                actual.0, actual.1, expected.0, expected.1
            ),
            ChannelErrorKind::Closed => write!(f, "handle is closed"),
            ChannelErrorKind::AlreadyClosed => write!(f, "handle already closed"),
            ChannelErrorKind::NotFound => write!(f, "no such channel"),
            ChannelErrorKind::InvalidName => write!(f, "invalid channel name"),
        }
    }
}

/// Error from a single channel operation
#[derive(Debug)]
pub struct ChannelError {
    pub op: ChannelOp,
    pub channel: ChannelName,
    pub kind: ChannelErrorKind,
}

impl ChannelError {
    pub fn new(op: ChannelOp, channel: &ChannelName, kind: ChannelErrorKind) -> Self {
        Self {
            op,
            channel: channel.clone(),
            kind,
        }
    }

    /// Wrap the last OS error
    pub(crate) fn last_os_error(op: ChannelOp, channel: &ChannelName) -> Self {
        Self::os(op, channel, io::Error::last_os_error())
    }

    /// Wrap an OS error, mapping `ENOENT` to [`ChannelErrorKind::NotFound`]
    pub(crate) fn os(op: ChannelOp, channel: &ChannelName, err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ChannelErrorKind::NotFound,
            _ => ChannelErrorKind::Os(err),
        };
        Self::new(op, channel, kind)
    }

    /// Whether the named channel did not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ChannelErrorKind::NotFound)
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.op, self.channel, self.kind)
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ChannelErrorKind::Os(e) => Some(e),
            _ => None,
        }
    }
}
