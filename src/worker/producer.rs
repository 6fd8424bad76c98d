//! Producer worker
//!
//! Sends frames from a [`FrameSource`] on one channel.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{spawn_worker, FrameSource, RunMode, StopFlag, WorkerEvent, WorkerState};
use crate::channel::ChannelHandle;
use crate::error::ChannelError;

/// Sends frames on a single channel
pub struct ProducerWorker {
    handle: Arc<dyn ChannelHandle>,
    source: Box<dyn FrameSource>,
    mode: RunMode,
    interval: Duration,
    stop: StopFlag,
    state: WorkerState,
    sent: u64,
}

impl ProducerWorker {
    /// Create a producer for the channel behind `handle`
    pub fn new(
        handle: Arc<dyn ChannelHandle>,
        source: impl FrameSource + 'static,
        mode: RunMode,
    ) -> Self {
        Self {
            handle,
            source: Box::new(source),
            mode,
            interval: Duration::ZERO,
            stop: StopFlag::new(),
            state: WorkerState::Idle,
            sent: 0,
        }
    }

    /// Pause between sends in continuous mode
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Share a stop flag with the controller
    pub fn stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Frames sent so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Run the send loop on the calling thread
    ///
    /// Blocks while the channel is full. Returns on stop request, after the
    /// single send in one-shot mode, or on the first channel error.
    pub fn run(&mut self) -> Result<(), ChannelError> {
        self.state = WorkerState::Running;
        let name = self.handle.name().clone();
        tracing::debug!(channel = %name, mode = ?self.mode, "Producer started");

        while !self.stop.is_stopped() {
            let frame = self.source.next_frame();

            if let Err(e) = self.handle.send(&frame) {
                self.state = WorkerState::Failed;
                return Err(e);
            }
            self.sent += 1;
            tracing::debug!(channel = %name, frame = %frame, "Frame sent");

            if self.mode == RunMode::OneShot {
                break;
            }
            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }

        self.state = WorkerState::Stopped;
        tracing::debug!(channel = %name, sent = self.sent, "Producer stopped");
        Ok(())
    }

    /// Run on a dedicated thread, reporting the outcome on `events`
    pub fn spawn(
        mut self,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> io::Result<JoinHandle<WorkerState>> {
        let channel = self.handle.name().clone();
        let stop = self.stop.clone();

        spawn_worker("producer", channel, stop, events, move || {
            let result = self.run();
            (result, self.sent)
        })
    }
}
