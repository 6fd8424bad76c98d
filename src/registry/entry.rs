//! Per-channel registry entry

use std::sync::Arc;
use std::sync::Mutex;

use crate::channel::{ChannelHandle, ChannelName};

/// Where an entry is in the shutdown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Handle open and usable
    Open,
    /// Close attempted (successfully or not)
    Closed,
    /// Removal from the system attempted
    Removed,
}

/// A named channel and this process's handle to it
pub struct ChannelEntry {
    /// Channel name
    pub name: ChannelName,

    /// Open handle, shared with the worker bound to this channel
    pub(super) handle: Arc<dyn ChannelHandle>,

    /// Shutdown progress
    pub(super) state: Mutex<EntryState>,
}

impl ChannelEntry {
    pub(super) fn new(name: ChannelName, handle: Arc<dyn ChannelHandle>) -> Self {
        Self {
            name,
            handle,
            state: Mutex::new(EntryState::Open),
        }
    }

    /// Handle for this channel
    pub fn handle(&self) -> Arc<dyn ChannelHandle> {
        Arc::clone(&self.handle)
    }

    /// Current shutdown state
    pub fn state(&self) -> EntryState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` if currently in `from`; returns whether the move happened
    pub(super) fn advance(&self, from: EntryState, next: EntryState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == from {
            *state = next;
            true
        } else {
            false
        }
    }
}

impl std::fmt::Debug for ChannelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEntry")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
