//! Cleanup results

use crate::channel::ChannelName;
use crate::error::ChannelError;

/// Outcome of a close-all or remove-all pass
///
/// Failures are collected rather than returned early so that every channel
/// gets its attempt.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Channels on which the operation succeeded
    pub succeeded: Vec<ChannelName>,
    /// Channels already gone (remove only)
    pub already_gone: Vec<ChannelName>,
    /// Channels skipped because this step already ran for them
    pub skipped: Vec<ChannelName>,
    /// Channels on which the operation failed
    pub failed: Vec<ChannelError>,
}

impl CleanupReport {
    /// Number of channels the operation was attempted on
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.already_gone.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
