//! CAN frame relay over named POSIX message queues
//!
//! A producer process sends fixed-size frames on a fixed set of named,
//! bounded, kernel-persisted channels; a consumer process, started before or
//! after it, receives them. Each process runs one worker thread per channel
//! and removes every channel exactly once when it shuts down.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use mq_relay::channel::PosixBackend;
//! use mq_relay::relay::{Relay, RelayConfig, Role, ShutdownSignal};
//!
//! # async fn example() -> mq_relay::error::Result<()> {
//! let mut signals = ShutdownSignal::install()?;
//! let relay = Relay::new(RelayConfig::default().max_messages(10), Arc::new(PosixBackend::new()));
//!
//! let report = relay
//!     .run_until(Role::Consumer, async move {
//!         signals.recv().await;
//!     })
//!     .await?;
//! std::process::exit(report.exit_code());
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod registry;
pub mod relay;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelAttributes, ChannelBackend, ChannelHandle, ChannelName, Frame};
pub use error::{ChannelError, ConfigError, Error, Result};
pub use registry::ChannelRegistry;
pub use relay::{Relay, RelayConfig, Role, ShutdownReport};
