//! Channel registry
//!
//! The registry owns every channel handle of a process. It opens the fixed
//! channel set at startup (all or nothing) and closes and removes it at
//! shutdown (every step attempted, failures collected).
//!
//! # Lifecycle
//!
//! ```text
//!   open_all ──► [Open] ──► close_all ──► [Closed] ──► remove_all ──► [Removed]
//!      │                        │                          │
//!      └─ any failure:          └─ each close attempted    └─ "not found" is
//!         close what opened,       once, errors logged        not a failure
//!         return error
//! ```
//!
//! Workers and the controller share handles through `Arc`; the registry
//! stays the single place that closes them.

pub mod entry;
pub mod report;
pub mod store;

pub use entry::{ChannelEntry, EntryState};
pub use report::CleanupReport;
pub use store::ChannelRegistry;
