//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Exit status used when a second interrupt arrives before the export stops.
pub const INTERRUPT_EXIT_STATUS: i32 = 130;

/// Shared cancellation flag.
///
/// Clones observe the same flag. The pipeline checks it between records and
/// between chunks; a cancelled export fails with `Cancelled` and leaves no
/// output behind.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Cancel this token on SIGINT or SIGTERM.
    ///
    /// The first signal lets the export stop and clean up its scratch file. A
    /// second one exits the process immediately. Only one handler can be
    /// installed per process.
    pub fn cancel_on_interrupt(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        let mut interrupted = false;
        ctrlc::set_handler(move || {
            if interrupted {
                std::process::exit(INTERRUPT_EXIT_STATUS);
            }
            interrupted = true;
            warn!("Interrupted, cancelling export");
            token.cancel();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_cancel_across_threads() {
        let token = CancellationToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_cancels_token() {
        use std::time::{Duration, Instant};

        let token = CancellationToken::new();
        token.cancel_on_interrupt().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !token.is_cancelled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(token.is_cancelled());
    }
}
