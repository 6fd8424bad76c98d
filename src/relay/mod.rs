//! Process lifecycle
//!
//! A relay process runs one role over the configured channel set:
//!
//! ```text
//!   ShutdownSignal::install ──► Relay::run_until(role, signal)
//!                                  │ validate config against host limits
//!                                  │ ChannelRegistry::open_all (all or nothing)
//!                                  │ one worker thread per channel
//!                                  ▼
//!                       signal │ worker failure │ all done (no linger)
//!                                  ▼
//!                       stop flag ─► close_all ─► remove_all ─► ShutdownReport
//! ```
//!
//! Teardown runs in the async controller, never inside a signal handler, and
//! never waits for workers blocked in the kernel.

pub mod config;
pub mod controller;
pub mod signal;

pub use config::{ChannelSpec, RelayConfig, DEFAULT_CHANNEL_NAMES, DEFAULT_PAYLOADS};
pub use controller::{Relay, Role, ShutdownReason, ShutdownReport};
pub use signal::ShutdownSignal;
