//! Relay lifecycle controller
//!
//! Opens the channel set, runs one worker per channel for the selected role
//! and tears everything down on shutdown.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::config::RelayConfig;
use crate::channel::{ChannelBackend, ChannelName};
use crate::error::{ChannelError, Result};
use crate::registry::{ChannelRegistry, CleanupReport};
use crate::worker::{
    ConsumerWorker, FixedFrame, FrameSink, PrintSink, ProducerWorker, StopFlag, WorkerEvent,
};

/// Which side of the channels this process works
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

/// Why the relay shut down
#[derive(Debug)]
pub enum ShutdownReason {
    /// External shutdown signal
    Interrupted,
    /// Every worker finished and the relay was not lingering
    Completed,
    /// A worker hit a channel error
    WorkerFailed(ChannelError),
}

/// Result of a relay run
#[derive(Debug)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    /// Close pass over every handle
    pub closed: CleanupReport,
    /// Removal pass, if removal on shutdown is enabled
    pub removed: Option<CleanupReport>,
}

impl ShutdownReport {
    /// Process exit status: 1 when a worker failed, 0 otherwise
    ///
    /// Cleanup failures are reported but do not change the status.
    pub fn exit_code(&self) -> i32 {
        match self.reason {
            ShutdownReason::WorkerFailed(_) => 1,
            ShutdownReason::Interrupted | ShutdownReason::Completed => 0,
        }
    }
}

type SinkFactory = Arc<dyn Fn(&ChannelName) -> Box<dyn FrameSink> + Send + Sync>;

/// Drives one process role over the configured channels
pub struct Relay {
    config: RelayConfig,
    backend: Arc<dyn ChannelBackend>,
    sink: SinkFactory,
}

impl Relay {
    /// Create a relay; consumers print what they receive
    pub fn new(config: RelayConfig, backend: Arc<dyn ChannelBackend>) -> Self {
        Self {
            config,
            backend,
            sink: Arc::new(|_: &ChannelName| -> Box<dyn FrameSink> { Box::new(PrintSink) }),
        }
    }

    /// Build the sink each consumer worker delivers to
    pub fn sink_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ChannelName) -> Box<dyn FrameSink> + Send + Sync + 'static,
    {
        self.sink = Arc::new(factory);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run `role` until `shutdown` resolves, a worker fails, or (when not
    /// lingering) every worker has finished
    ///
    /// Startup errors (invalid config, a channel that cannot be opened) are
    /// returned as `Err`; everything after startup ends in a report.
    pub async fn run_until<F>(&self, role: Role, shutdown: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        self.config.validate(&self.backend.limits())?;

        let registry = ChannelRegistry::open_all(
            Arc::clone(&self.backend),
            &self.config.names(),
            self.config.attributes,
        )?;

        let stop = StopFlag::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut running = 0usize;
        for (spec, entry) in self.config.channels.iter().zip(registry.entries()) {
            let spawned = match role {
                Role::Producer => ProducerWorker::new(
                    entry.handle(),
                    FixedFrame(spec.payload.clone()),
                    self.config.mode,
                )
                .interval(self.config.send_interval)
                .stop_flag(stop.clone())
                .spawn(events_tx.clone()),
                Role::Consumer => {
                    ConsumerWorker::new(entry.handle(), (self.sink)(&spec.name), self.config.mode)
                        .stop_flag(stop.clone())
                        .spawn(events_tx.clone())
                }
            };

            if let Err(e) = spawned {
                tracing::error!(channel = %spec.name, error = %e, "Failed to spawn worker");
                let _ = self.teardown(&registry, &stop);
                return Err(e.into());
            }
            running += 1;
        }
        drop(events_tx);

        tracing::info!(
            role = %role,
            channels = registry.len(),
            mode = ?self.config.mode,
            "Relay running"
        );

        tokio::pin!(shutdown);
        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break ShutdownReason::Interrupted;
                }
                event = events_rx.recv(), if running > 0 => match event {
                    Some(WorkerEvent::Stopped { channel, frames }) => {
                        running -= 1;
                        tracing::info!(channel = %channel, frames = frames, "Worker finished");

                        if running == 0 {
                            if !self.config.linger {
                                break ShutdownReason::Completed;
                            }
                            tracing::info!("All workers finished, waiting for shutdown signal");
                        }
                    }
                    Some(WorkerEvent::Failed { channel, error }) => {
                        tracing::error!(channel = %channel, error = %error, "Worker failed, shutting down");
                        break ShutdownReason::WorkerFailed(error);
                    }
                    None => running = 0,
                },
            }
        };

        let (closed, removed) = self.teardown(&registry, &stop);
        Ok(ShutdownReport {
            reason,
            closed,
            removed,
        })
    }

    /// Stop workers, close every handle, remove every channel
    ///
    /// Does not wait for workers: one blocked in `send`/`receive` either
    /// wakes with a closed-handle error or finishes its operation on its own.
    fn teardown(
        &self,
        registry: &ChannelRegistry,
        stop: &StopFlag,
    ) -> (CleanupReport, Option<CleanupReport>) {
        tracing::info!("Cleaning up channels");
        stop.request_stop();

        let closed = registry.close_all();
        let removed = if self.config.remove_on_shutdown {
            Some(registry.remove_all())
        } else {
            None
        };

        tracing::info!(
            closed = closed.succeeded.len(),
            close_failures = closed.failed.len(),
            removed = removed.as_ref().map_or(0, |r| r.succeeded.len()),
            remove_failures = removed.as_ref().map_or(0, |r| r.failed.len()),
            "Cleanup finished"
        );

        (closed, removed)
    }

    /// Remove every configured channel without opening it
    pub fn remove_channels(&self) -> Result<CleanupReport> {
        for spec in &self.config.channels {
            spec.name.validate()?;
        }
        Ok(ChannelRegistry::remove_names(
            self.backend.as_ref(),
            &self.config.names(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    use super::*;
    use crate::channel::{Frame, MemoryBackend};
    use crate::error::{ChannelOp, Error};
    use crate::testing::FaultyBackend;
    use crate::worker::RunMode;

    fn config(tag: &str) -> RelayConfig {
        RelayConfig::default().instance(tag).max_messages(10)
    }

    #[tokio::test]
    async fn test_end_to_end_consumer_first() {
        let backend = MemoryBackend::new();
        let (sink_tx, delivered) = std_mpsc::channel();

        let consumer = Relay::new(config("e2e").linger(false), Arc::new(backend.clone()))
            .sink_factory(move |_: &ChannelName| -> Box<dyn FrameSink> {
                Box::new(sink_tx.clone())
            });
        let producer = Relay::new(config("e2e").linger(false), Arc::new(backend.clone()));

        // The consumer is polled first, so it creates the channels and the producer attaches
        let (consumed, produced) = tokio::join!(
            consumer.run_until(Role::Consumer, std::future::pending()),
            producer.run_until(Role::Producer, std::future::pending()),
        );
        let consumed = consumed.unwrap();
        let produced = produced.unwrap();

        assert!(matches!(consumed.reason, ShutdownReason::Completed));
        assert!(matches!(produced.reason, ShutdownReason::Completed));
        assert_eq!(consumed.exit_code(), 0);

        let mut received: Vec<(ChannelName, Frame)> = delivered.try_iter().collect();
        received.sort_by(|a, b| a.0.cmp(&b.0));
        let mut expected: Vec<(ChannelName, Frame)> = config("e2e")
            .channels
            .into_iter()
            .map(|c| (c.name, c.payload))
            .collect();
        expected.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(received, expected);

        // Both sides removed; whichever ran second found nothing left
        let removed = [consumed.removed.unwrap(), produced.removed.unwrap()];
        assert!(removed.iter().all(CleanupReport::is_clean));
        let gone: usize = removed.iter().map(|r| r.succeeded.len()).sum();
        assert_eq!(gone, 4);
        for name in config("e2e").names() {
            assert!(!backend.exists(&name));
        }
    }

    #[tokio::test]
    async fn test_interrupt_with_blocked_producer() {
        let backend = MemoryBackend::new();
        let relay = Relay::new(
            config("blocked")
                .max_messages(2)
                .mode(RunMode::Continuous)
                .send_interval(Duration::ZERO),
            Arc::new(backend.clone()),
        );

        // No consumer: every producer fills its channel and blocks
        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            relay.run_until(Role::Producer, shutdown),
        )
        .await
        .expect("shutdown must not wait on blocked workers")
        .unwrap();

        assert!(matches!(report.reason, ShutdownReason::Interrupted));
        assert_eq!(report.closed.succeeded.len(), 4);
        assert_eq!(report.removed.unwrap().succeeded.len(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_attempts_every_channel_once() {
        let names = config("once").names();
        let backend = FaultyBackend::new().fail_close(&names[0]);
        let relay = Relay::new(config("once"), Arc::new(backend.clone()));

        let report = relay
            .run_until(Role::Consumer, std::future::ready(()))
            .await
            .unwrap();

        assert!(matches!(report.reason, ShutdownReason::Interrupted));
        assert_eq!(report.closed.attempted(), 4);
        assert_eq!(report.closed.failed.len(), 1);
        assert_eq!(report.closed.failed[0].channel, names[0]);
        assert_eq!(report.removed.unwrap().attempted(), 4);

        for name in &names {
            assert_eq!(backend.close_calls(name), 1);
            assert_eq!(backend.unlink_calls(name), 1);
        }
    }

    #[tokio::test]
    async fn test_worker_failure_stops_process() {
        let names = config("fail").names();
        let backend = FaultyBackend::new().fail_send(&names[3]);
        let relay = Relay::new(config("fail"), Arc::new(backend.clone()));

        let report = relay
            .run_until(Role::Producer, std::future::pending())
            .await
            .unwrap();

        match &report.reason {
            ShutdownReason::WorkerFailed(e) => {
                assert_eq!(e.channel, names[3]);
                assert_eq!(e.op, ChannelOp::Send);
            }
            other => panic!("unexpected reason: {:?}", other),
        }
        assert_eq!(report.exit_code(), 1);
        for name in &names {
            assert_eq!(backend.close_calls(name), 1);
        }
    }

    #[tokio::test]
    async fn test_open_failure_aborts_startup() {
        let names = config("startup").names();
        let backend = FaultyBackend::new().fail_open(&names[1]);
        let relay = Relay::new(config("startup"), Arc::new(backend.clone()));

        let err = relay
            .run_until(Role::Consumer, std::future::pending())
            .await
            .unwrap_err();

        match err {
            Error::Channel(e) => {
                assert_eq!(e.op, ChannelOp::Open);
                assert_eq!(e.channel, names[1]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(backend.close_calls(&names[0]), 1);
        assert_eq!(backend.unlink_calls(&names[0]), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_opens_nothing() {
        let backend = FaultyBackend::new();
        let relay = Relay::new(config("invalid").max_messages(0), Arc::new(backend.clone()));

        let err = relay
            .run_until(Role::Producer, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        for name in config("invalid").names() {
            assert_eq!(backend.open_calls(&name), 0);
        }
    }

    #[tokio::test]
    async fn test_linger_waits_for_shutdown() {
        let backend = MemoryBackend::new();
        let relay = Relay::new(config("linger").keep_channels(), Arc::new(backend.clone()));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let run = relay.run_until(Role::Producer, async move {
            let _ = stop_rx.await;
        });
        tokio::pin!(run);

        // One-shot sends complete quickly, but the relay keeps running
        assert!(tokio::time::timeout(Duration::from_millis(100), &mut run)
            .await
            .is_err());
        for name in config("linger").names() {
            assert_eq!(backend.depth(&name), Some(1));
        }

        stop_tx.send(()).unwrap();
        let report = run.await.unwrap();
        assert!(matches!(report.reason, ShutdownReason::Interrupted));
        assert!(report.removed.is_none());
        assert!(backend.exists(&config("linger").names()[0]));
    }

    #[test]
    fn test_remove_channels_by_name() {
        let backend = MemoryBackend::new();
        let relay = Relay::new(config("remove").keep_channels(), Arc::new(backend.clone()));

        // A run that keeps its channels leaves them behind, as a killed process would
        tokio_test::block_on(relay.run_until(Role::Producer, std::future::ready(()))).unwrap();
        assert!(backend.exists(&config("remove").names()[0]));

        let report = relay.remove_channels().unwrap();
        assert_eq!(report.succeeded.len(), 4);
        for name in config("remove").names() {
            assert!(!backend.exists(&name));
        }

        let again = relay.remove_channels().unwrap();
        assert!(again.is_clean());
        assert_eq!(again.already_gone.len(), 4);
    }
}
