//! Per-channel workers
//!
//! Each worker is bound to one channel for its lifetime and runs on its own
//! OS thread, since `send` and `receive` block in the kernel.
//!
//! ```text
//!   Idle ──run──► Running ──stop flag / one-shot done──► Stopped
//!                    │
//!                    └──channel error──► Failed ──► WorkerEvent::Failed
//! ```
//!
//! The stop flag is checked between operations. A worker blocked in `send`
//! or `receive` is not interrupted, so at most one more operation may
//! complete after a stop request.

pub mod consumer;
pub mod producer;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

use crate::channel::{ChannelName, Frame};
use crate::error::ChannelError;

pub use consumer::ConsumerWorker;
pub use producer::ProducerWorker;

/// How long a worker keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One operation, then stop
    OneShot,
    /// Until stopped or failed
    Continuous,
}

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, not yet running
    Idle,
    /// Looping over send/receive
    Running,
    /// Ended normally
    Stopped,
    /// Ended by a channel error
    Failed,
}

/// Reported to the controller when a worker thread ends
#[derive(Debug)]
pub enum WorkerEvent {
    /// Worker ended normally after moving `frames` frames
    Stopped { channel: ChannelName, frames: u64 },
    /// Worker hit a channel error
    Failed {
        channel: ChannelName,
        error: ChannelError,
    },
}

impl WorkerEvent {
    pub fn channel(&self) -> &ChannelName {
        match self {
            WorkerEvent::Stopped { channel, .. } | WorkerEvent::Failed { channel, .. } => channel,
        }
    }
}

/// Cooperative stop request shared between the controller and its workers
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Supplies the frames a producer sends
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Frame;
}

/// Repeats one fixed frame
#[derive(Debug, Clone)]
pub struct FixedFrame(pub Frame);

impl FrameSource for FixedFrame {
    fn next_frame(&mut self) -> Frame {
        self.0.clone()
    }
}

/// Receives the frames a consumer dequeues
pub trait FrameSink: Send {
    fn deliver(&mut self, channel: &ChannelName, frame: Frame);
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn deliver(&mut self, channel: &ChannelName, frame: Frame) {
        (**self).deliver(channel, frame)
    }
}

/// Prints each frame as one stdout line: `<channel> 0x.. 0x..`
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintSink;

impl FrameSink for PrintSink {
    fn deliver(&mut self, channel: &ChannelName, frame: Frame) {
        use std::io::Write;

        let mut out = io::stdout().lock();
        // Stdout going away (closed pipe) must not take the worker down
        let _ = writeln!(out, "{} {}", channel, frame);
        let _ = out.flush();
    }
}

/// Forwards frames to a std channel; a dropped receiver discards them
impl FrameSink for std::sync::mpsc::Sender<(ChannelName, Frame)> {
    fn deliver(&mut self, channel: &ChannelName, frame: Frame) {
        let _ = self.send((channel.clone(), frame));
    }
}

/// Run a worker body on a named thread and report how it ended
///
/// A channel error seen after a stop request is the expected result of the
/// handle being closed under a blocked worker and counts as a normal stop.
pub(crate) fn spawn_worker<F>(
    role: &str,
    channel: ChannelName,
    stop: StopFlag,
    events: mpsc::UnboundedSender<WorkerEvent>,
    body: F,
) -> io::Result<JoinHandle<WorkerState>>
where
    F: FnOnce() -> (Result<(), ChannelError>, u64) + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{}:{}", role, channel))
        .spawn(move || {
            let (result, frames) = body();

            let (state, event) = match result {
                Ok(()) => (WorkerState::Stopped, WorkerEvent::Stopped { channel, frames }),
                Err(e) if stop.is_stopped() => {
                    tracing::debug!(channel = %channel, error = %e, "Worker unblocked by shutdown");
                    (WorkerState::Stopped, WorkerEvent::Stopped { channel, frames })
                }
                Err(error) => {
                    tracing::error!(channel = %channel, error = %error, "Worker failed");
                    (WorkerState::Failed, WorkerEvent::Failed { channel, error })
                }
            };

            // The controller may already be gone during shutdown
            let _ = events.send(event);
            state
        })
}
