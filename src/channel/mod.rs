//! Named, bounded channels for fixed-size frames
//!
//! A channel is identified by a system-wide [`ChannelName`]. Opening is
//! create-or-attach: every process that opens the same name shares one queue.
//!
//! ```text
//!   producer process                          consumer process
//!  ┌────────────────┐      /mq_hv_active     ┌────────────────┐
//!  │ ChannelHandle ─┼──► [f3][f2][f1] ──────►┼─ ChannelHandle │
//!  └────────────────┘   (kernel, bounded)    └────────────────┘
//! ```
//!
//! `send` blocks while the queue is full, `receive` blocks while it is empty.
//! Frames are delivered whole and in FIFO order per channel.
//!
//! Two backends implement [`ChannelBackend`]:
//! - [`PosixBackend`]: POSIX message queues (`mq_open(3)`), Linux only
//! - [`MemoryBackend`]: an in-process namespace with the same semantics

pub mod frame;
pub mod limits;
pub mod memory;
#[cfg(target_os = "linux")]
pub mod posix;

use std::sync::Arc;

use crate::error::ChannelError;

pub use frame::{ChannelAttributes, ChannelName, Frame, CAN_DATA_FRAME_SIZE};
pub use limits::HostLimits;
pub use memory::MemoryBackend;
#[cfg(target_os = "linux")]
pub use posix::PosixBackend;

/// Process-local handle to an open named channel
///
/// A handle may be used from several threads. Closing it twice is an error,
/// and every operation after close fails.
pub trait ChannelHandle: Send + Sync {
    /// Name this handle was opened with
    fn name(&self) -> &ChannelName;

    /// Attributes of the underlying queue
    fn attributes(&self) -> ChannelAttributes;

    /// Enqueue a frame, blocking while the channel is full
    fn send(&self, frame: &Frame) -> Result<(), ChannelError>;

    /// Dequeue the oldest frame, blocking while the channel is empty
    fn receive(&self) -> Result<Frame, ChannelError>;

    /// Release this handle
    ///
    /// Safe to call while another thread is blocked in `send` or `receive`
    /// on the same handle; calls started afterwards fail with `Closed`.
    fn close(&self) -> Result<(), ChannelError>;

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;
}

/// Namespace of named channels
pub trait ChannelBackend: Send + Sync {
    /// Create the channel if absent, attach if present
    fn open(
        &self,
        name: &ChannelName,
        attrs: ChannelAttributes,
    ) -> Result<Arc<dyn ChannelHandle>, ChannelError>;

    /// Remove the name from the namespace; open handles keep working
    fn unlink(&self, name: &ChannelName) -> Result<(), ChannelError>;

    /// Limits the host imposes on channel attributes
    fn limits(&self) -> HostLimits {
        HostLimits::unlimited()
    }
}

/// Reject a frame whose length differs from the channel's message size
pub(crate) fn check_frame_size(
    name: &ChannelName,
    attrs: ChannelAttributes,
    frame: &Frame,
) -> Result<(), ChannelError> {
    use crate::error::{ChannelErrorKind, ChannelOp};

    if frame.len() != attrs.message_size {
        return Err(ChannelError::new(
            ChannelOp::Send,
            name,
            ChannelErrorKind::SizeMismatch {
                expected: attrs.message_size,
                actual: frame.len(),
            },
        ));
    }
    Ok(())
}
