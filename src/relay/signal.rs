//! Process interrupt listener
//!
//! Handlers are registered by [`ShutdownSignal::install`], not on first poll,
//! so a signal arriving while channels are still being opened is recorded
//! and observed as soon as the controller starts waiting.

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

/// SIGINT / SIGTERM listener
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignal {
    /// Register the handlers; must be called inside a tokio runtime
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next signal; returns its name
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_signal_before_wait_is_not_lost() {
        let mut signals = ShutdownSignal::install().unwrap();

        // SAFETY: a handler for SIGTERM is installed above.
        unsafe {
            libc::raise(libc::SIGTERM);
        }

        let name = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(name, "SIGTERM");
    }
}
