//! In-process channel backend
//!
//! Mirrors POSIX message queue semantics inside one process: a shared
//! namespace of bounded FIFO queues. Clones of a [`MemoryBackend`] share the
//! namespace, so two registries built from clones behave like two processes
//! attached to the same kernel queues.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use super::{check_frame_size, ChannelAttributes, ChannelBackend, ChannelHandle, ChannelName, Frame};
use crate::error::{ChannelError, ChannelErrorKind, ChannelOp};

/// Shared in-process namespace of named channels
#[derive(Clone, Default)]
pub struct MemoryBackend {
    queues: Arc<Mutex<HashMap<ChannelName, Arc<Queue>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a channel with this name currently exists
    pub fn exists(&self, name: &ChannelName) -> bool {
        lock(&self.queues).contains_key(name)
    }

    /// Number of frames waiting on a channel
    pub fn depth(&self, name: &ChannelName) -> Option<usize> {
        let queue = lock(&self.queues).get(name).cloned()?;
        let depth = lock(&queue.frames).len();
        Some(depth)
    }
}

impl ChannelBackend for MemoryBackend {
    fn open(
        &self,
        name: &ChannelName,
        attrs: ChannelAttributes,
    ) -> Result<Arc<dyn ChannelHandle>, ChannelError> {
        let mut queues = lock(&self.queues);

        let queue = match queues.get(name) {
            Some(existing) => {
                if existing.attrs != attrs {
                    return Err(ChannelError::new(
                        ChannelOp::Open,
                        name,
                        ChannelErrorKind::AttributeMismatch {
                            expected: (attrs.max_messages, attrs.message_size),
                            actual: (existing.attrs.max_messages, existing.attrs.message_size),
                        },
                    ));
                }
                tracing::debug!(channel = %name, "Attached to existing channel");
                Arc::clone(existing)
            }
            None => {
                let queue = Arc::new(Queue::new(attrs));
                queues.insert(name.clone(), Arc::clone(&queue));
                tracing::debug!(channel = %name, "Created channel");
                queue
            }
        };

        Ok(Arc::new(MemoryHandle {
            name: name.clone(),
            queue,
            closed: AtomicBool::new(false),
        }))
    }

    fn unlink(&self, name: &ChannelName) -> Result<(), ChannelError> {
        match lock(&self.queues).remove(name) {
            Some(_) => Ok(()),
            None => Err(ChannelError::new(
                ChannelOp::Remove,
                name,
                ChannelErrorKind::NotFound,
            )),
        }
    }
}

struct Queue {
    attrs: ChannelAttributes,
    frames: Mutex<VecDeque<Bytes>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl Queue {
    fn new(attrs: ChannelAttributes) -> Self {
        Self {
            attrs,
            frames: Mutex::new(VecDeque::with_capacity(attrs.max_messages)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }
}

struct MemoryHandle {
    name: ChannelName,
    queue: Arc<Queue>,
    closed: AtomicBool,
}

impl MemoryHandle {
    fn closed_error(&self, op: ChannelOp) -> ChannelError {
        ChannelError::new(op, &self.name, ChannelErrorKind::Closed)
    }
}

impl ChannelHandle for MemoryHandle {
    fn name(&self) -> &ChannelName {
        &self.name
    }

    fn attributes(&self) -> ChannelAttributes {
        self.queue.attrs
    }

    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        check_frame_size(&self.name, self.queue.attrs, frame)?;

        let mut frames = lock(&self.queue.frames);
        loop {
            // Checked under the lock so a concurrent close cannot slip
            // between the check and the wait.
            if self.is_closed() {
                return Err(self.closed_error(ChannelOp::Send));
            }
            if frames.len() < self.queue.attrs.max_messages {
                break;
            }
            frames = self
                .queue
                .not_full
                .wait(frames)
                .unwrap_or_else(PoisonError::into_inner);
        }

        frames.push_back(frame.clone().into_bytes());
        drop(frames);
        self.queue.not_empty.notify_all();
        Ok(())
    }

    fn receive(&self) -> Result<Frame, ChannelError> {
        let mut frames = lock(&self.queue.frames);
        let data = loop {
            if self.is_closed() {
                return Err(self.closed_error(ChannelOp::Receive));
            }
            if let Some(data) = frames.pop_front() {
                break data;
            }
            frames = self
                .queue
                .not_empty
                .wait(frames)
                .unwrap_or_else(PoisonError::into_inner);
        };
        drop(frames);
        self.queue.not_full.notify_all();
        Ok(Frame::new(data))
    }

    fn close(&self) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ChannelError::new(
                ChannelOp::Close,
                &self.name,
                ChannelErrorKind::AlreadyClosed,
            ));
        }

        // Wake threads blocked on this handle; they observe the flag and fail.
        // Waiters on other handles re-check their own state and go back to sleep.
        let _frames = lock(&self.queue.frames);
        self.queue.not_empty.notify_all();
        self.queue.not_full.notify_all();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
