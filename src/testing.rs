//! Test doubles shared by unit tests

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use crate::channel::{
    ChannelAttributes, ChannelBackend, ChannelHandle, ChannelName, Frame, MemoryBackend,
};
use crate::error::{ChannelError, ChannelErrorKind, ChannelOp};
use crate::relay::config::DEFAULT_CHANNEL_NAMES;

/// The four status channel names with a per-test suffix
pub(crate) fn status_names(tag: &str) -> Vec<ChannelName> {
    DEFAULT_CHANNEL_NAMES
        .iter()
        .map(|n| ChannelName::new(*n).with_suffix(tag))
        .collect()
}

type Calls = Arc<Mutex<HashMap<(ChannelOp, ChannelName), usize>>>;

/// Memory backend that counts calls and fails chosen operations
#[derive(Clone, Default)]
pub(crate) struct FaultyBackend {
    inner: MemoryBackend,
    fail_open: HashSet<ChannelName>,
    fail_close: HashSet<ChannelName>,
    fail_send: HashSet<ChannelName>,
    calls: Calls,
}

impl FaultyBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_open(mut self, name: &ChannelName) -> Self {
        self.fail_open.insert(name.clone());
        self
    }

    pub(crate) fn fail_close(mut self, name: &ChannelName) -> Self {
        self.fail_close.insert(name.clone());
        self
    }

    pub(crate) fn fail_send(mut self, name: &ChannelName) -> Self {
        self.fail_send.insert(name.clone());
        self
    }

    pub(crate) fn open_calls(&self, name: &ChannelName) -> usize {
        count(&self.calls, ChannelOp::Open, name)
    }

    pub(crate) fn close_calls(&self, name: &ChannelName) -> usize {
        count(&self.calls, ChannelOp::Close, name)
    }

    pub(crate) fn unlink_calls(&self, name: &ChannelName) -> usize {
        count(&self.calls, ChannelOp::Remove, name)
    }
}

fn record(calls: &Calls, op: ChannelOp, name: &ChannelName) {
    *calls.lock().unwrap().entry((op, name.clone())).or_default() += 1;
}

fn count(calls: &Calls, op: ChannelOp, name: &ChannelName) -> usize {
    calls
        .lock()
        .unwrap()
        .get(&(op, name.clone()))
        .copied()
        .unwrap_or(0)
}

fn injected(op: ChannelOp, name: &ChannelName) -> ChannelError {
    ChannelError::new(
        op,
        name,
        ChannelErrorKind::Os(io::Error::from_raw_os_error(libc::EBADF)),
    )
}

impl ChannelBackend for FaultyBackend {
    fn open(
        &self,
        name: &ChannelName,
        attrs: ChannelAttributes,
    ) -> Result<Arc<dyn ChannelHandle>, ChannelError> {
        record(&self.calls, ChannelOp::Open, name);
        if self.fail_open.contains(name) {
            return Err(ChannelError::new(
                ChannelOp::Open,
                name,
                ChannelErrorKind::Os(io::Error::from_raw_os_error(libc::EMFILE)),
            ));
        }

        let inner = self.inner.open(name, attrs)?;
        Ok(Arc::new(FaultyHandle {
            inner,
            fail_close: self.fail_close.contains(name),
            fail_send: self.fail_send.contains(name),
            calls: Arc::clone(&self.calls),
        }))
    }

    fn unlink(&self, name: &ChannelName) -> Result<(), ChannelError> {
        record(&self.calls, ChannelOp::Remove, name);
        self.inner.unlink(name)
    }
}

struct FaultyHandle {
    inner: Arc<dyn ChannelHandle>,
    fail_close: bool,
    fail_send: bool,
    calls: Calls,
}

impl ChannelHandle for FaultyHandle {
    fn name(&self) -> &ChannelName {
        self.inner.name()
    }

    fn attributes(&self) -> ChannelAttributes {
        self.inner.attributes()
    }

    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        if self.fail_send {
            return Err(injected(ChannelOp::Send, self.inner.name()));
        }
        self.inner.send(frame)
    }

    fn receive(&self) -> Result<Frame, ChannelError> {
        self.inner.receive()
    }

    fn close(&self) -> Result<(), ChannelError> {
        record(&self.calls, ChannelOp::Close, self.inner.name());
        // Release the real handle either way so blocked threads wake up
        self.inner.close()?;
        if self.fail_close {
            return Err(injected(ChannelOp::Close, self.inner.name()));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
