//! Consumer worker
//!
//! Receives frames from one channel and hands them to a [`FrameSink`].

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use super::{spawn_worker, FrameSink, RunMode, StopFlag, WorkerEvent, WorkerState};
use crate::channel::ChannelHandle;
use crate::error::ChannelError;

/// Receives frames on a single channel
pub struct ConsumerWorker {
    handle: Arc<dyn ChannelHandle>,
    sink: Box<dyn FrameSink>,
    mode: RunMode,
    stop: StopFlag,
    state: WorkerState,
    received: u64,
}

impl ConsumerWorker {
    /// Create a consumer for the channel behind `handle`
    pub fn new(handle: Arc<dyn ChannelHandle>, sink: impl FrameSink + 'static, mode: RunMode) -> Self {
        Self {
            handle,
            sink: Box::new(sink),
            mode,
            stop: StopFlag::new(),
            state: WorkerState::Idle,
            received: 0,
        }
    }

    /// Share a stop flag with the controller
    pub fn stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Frames received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Run the receive loop on the calling thread
    ///
    /// Blocks while the channel is empty.
    pub fn run(&mut self) -> Result<(), ChannelError> {
        self.state = WorkerState::Running;
        let name = self.handle.name().clone();
        tracing::debug!(channel = %name, mode = ?self.mode, "Consumer started");

        while !self.stop.is_stopped() {
            let frame = match self.handle.receive() {
                Ok(frame) => frame,
                Err(e) => {
                    self.state = WorkerState::Failed;
                    return Err(e);
                }
            };
            self.received += 1;
            tracing::debug!(channel = %name, frame = %frame, "Frame received");

            self.sink.deliver(&name, frame);

            if self.mode == RunMode::OneShot {
                break;
            }
        }

        self.state = WorkerState::Stopped;
        tracing::debug!(channel = %name, received = self.received, "Consumer stopped");
        Ok(())
    }

    /// Run on a dedicated thread, reporting the outcome on `events`
    pub fn spawn(
        mut self,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> io::Result<JoinHandle<WorkerState>> {
        let channel = self.handle.name().clone();
        let stop = self.stop.clone();

        spawn_worker("consumer", channel, stop, events, move || {
            let result = self.run();
            (result, self.received)
        })
    }
}
