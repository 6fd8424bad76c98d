//! Channel names and frames
//!
//! This module defines the key type identifying a named channel and the
//! fixed-size frames carried over it.

use std::fmt;

use bytes::Bytes;

use crate::error::ConfigError;

/// Size of a CAN data frame payload in bytes
pub const CAN_DATA_FRAME_SIZE: usize = 8;

/// Longest name accepted for a POSIX message queue (`NAME_MAX`)
pub const MAX_NAME_LEN: usize = 255;

/// System-wide identifier of a named channel (e.g., "/mq_hv_active")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// Create a channel name without validation
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Create a validated channel name
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let name = Self::new(name);
        name.validate()?;
        Ok(name)
    }

    /// Check the POSIX naming rules: a leading slash, no other slash,
    /// no NUL, at most `NAME_MAX` bytes after the slash.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rest = match self.0.strip_prefix('/') {
            Some(rest) => rest,
            None => return Err(ConfigError::InvalidName(self.0.clone())),
        };

        if rest.is_empty()
            || rest.len() > MAX_NAME_LEN
            || rest.contains('/')
            || rest.contains('\0')
        {
            return Err(ConfigError::InvalidName(self.0.clone()));
        }

        Ok(())
    }

    /// Append an instance suffix: `/mq_hv_active` + `7` → `/mq_hv_active_7`
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}_{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Per-channel attributes, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAttributes {
    /// Maximum number of queued frames before senders block
    pub max_messages: usize,
    /// Exact size of every frame in bytes
    pub message_size: usize,
}

impl ChannelAttributes {
    pub fn new(max_messages: usize, message_size: usize) -> Self {
        Self {
            max_messages,
            message_size,
        }
    }
}

impl Default for ChannelAttributes {
    fn default() -> Self {
        Self {
            max_messages: 100,
            message_size: CAN_DATA_FRAME_SIZE,
        }
    }
}

/// One immutable unit of data on a channel
///
/// Cheap to clone: the payload is reference-counted `Bytes`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame(Bytes);

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn from_static(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl<const N: usize> From<[u8; N]> for Frame {
    fn from(a: [u8; N]) -> Self {
        Self(Bytes::copy_from_slice(&a))
    }
}

impl fmt::Display for Frame {
    /// Hex dump: `0x00 0x01 0x02`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "0x{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[{}]", self)
    }
}
