//! Channel registry implementation

use std::sync::Arc;

use super::entry::{ChannelEntry, EntryState};
use super::report::CleanupReport;
use crate::channel::{ChannelAttributes, ChannelBackend, ChannelHandle, ChannelName};
use crate::error::ChannelError;

/// The fixed set of channels a process works with
pub struct ChannelRegistry {
    /// Namespace the channels live in
    backend: Arc<dyn ChannelBackend>,

    /// Attributes every channel was opened with
    attrs: ChannelAttributes,

    /// Entries in configuration order
    entries: Vec<ChannelEntry>,
}

impl ChannelRegistry {
    /// Create or attach every named channel
    ///
    /// All or nothing: if one open fails, the handles opened so far are
    /// closed and the error is returned. Channels are not removed on this
    /// path since a peer process may already be using them.
    pub fn open_all(
        backend: Arc<dyn ChannelBackend>,
        names: &[ChannelName],
        attrs: ChannelAttributes,
    ) -> Result<Self, ChannelError> {
        let mut entries = Vec::with_capacity(names.len());

        for name in names {
            match backend.open(name, attrs) {
                Ok(handle) => {
                    tracing::info!(
                        channel = %name,
                        max_messages = attrs.max_messages,
                        message_size = attrs.message_size,
                        "Channel opened"
                    );
                    entries.push(ChannelEntry::new(name.clone(), handle));
                }
                Err(e) => {
                    tracing::error!(channel = %name, error = %e, "Failed to open channel");

                    for entry in &entries {
                        if let Err(close_err) = entry.handle.close() {
                            tracing::warn!(
                                channel = %entry.name,
                                error = %close_err,
                                "Failed to close channel after aborted startup"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            backend,
            attrs,
            entries,
        })
    }

    /// Attributes shared by all channels
    pub fn attributes(&self) -> ChannelAttributes {
        self.attrs
    }

    /// Channel names in configuration order
    pub fn names(&self) -> impl Iterator<Item = &ChannelName> {
        self.entries.iter().map(|e| &e.name)
    }

    /// Entries in configuration order
    pub fn entries(&self) -> &[ChannelEntry] {
        &self.entries
    }

    /// Handle for a channel
    pub fn handle(&self, name: &ChannelName) -> Option<Arc<dyn ChannelHandle>> {
        self.entries
            .iter()
            .find(|e| &e.name == name)
            .map(ChannelEntry::handle)
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close every handle
    ///
    /// Each handle gets exactly one close attempt over the registry's
    /// lifetime; a repeated call skips handles already closed.
    pub fn close_all(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for entry in &self.entries {
            if !entry.advance(EntryState::Open, EntryState::Closed) {
                report.skipped.push(entry.name.clone());
                continue;
            }

            match entry.handle.close() {
                Ok(()) => {
                    tracing::debug!(channel = %entry.name, "Channel closed");
                    report.succeeded.push(entry.name.clone());
                }
                Err(e) => {
                    tracing::warn!(channel = %entry.name, error = %e, "Failed to close channel");
                    report.failed.push(e);
                }
            }
        }

        report
    }

    /// Remove every channel from the system
    ///
    /// Each name gets exactly one removal attempt over the registry's
    /// lifetime. A channel already removed by a peer is not a failure.
    pub fn remove_all(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for entry in &self.entries {
            let first = entry.advance(EntryState::Closed, EntryState::Removed)
                || entry.advance(EntryState::Open, EntryState::Removed);
            if !first {
                report.skipped.push(entry.name.clone());
                continue;
            }
            remove_one(self.backend.as_ref(), &entry.name, &mut report);
        }

        report
    }

    /// Remove channels by name without opening them
    pub fn remove_names(backend: &dyn ChannelBackend, names: &[ChannelName]) -> CleanupReport {
        let mut report = CleanupReport::default();
        for name in names {
            remove_one(backend, name, &mut report);
        }
        report
    }
}

fn remove_one(backend: &dyn ChannelBackend, name: &ChannelName, report: &mut CleanupReport) {
    match backend.unlink(name) {
        Ok(()) => {
            tracing::info!(channel = %name, "Channel removed");
            report.succeeded.push(name.clone());
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(channel = %name, "Channel already removed");
            report.already_gone.push(name.clone());
        }
        Err(e) => {
            tracing::warn!(channel = %name, error = %e, "Failed to remove channel");
            report.failed.push(e);
        }
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("attrs", &self.attrs)
            .field("entries", &self.entries)
            .finish()
    }
}
