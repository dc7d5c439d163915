//! Retry policy for moves that hit a file locked by another process.
//!
//! The wait between attempts is a plain blocking sleep. Everything that
//! decides *whether* to retry lives here so the move logic never sleeps on
//! its own.

use log::warn;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Default number of attempts per move: the first try plus one retry.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default wait before the retry.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// How often and how patiently a failing move is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Same attempt count as the default policy, without waiting.
    pub fn immediate() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. Returns the last error.
    ///
    /// `subject` only appears in log messages.
    pub fn run<T, F>(&self, subject: &Path, mut op: F) -> io::Result<T>
    where
        F: FnMut() -> io::Result<T>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_transient(&e) => {
                    warn!(
                        "{} is in use ({}), retrying in {}s (attempt {}/{})",
                        subject.display(),
                        e,
                        self.backoff.as_secs_f32(),
                        attempt + 1,
                        self.max_attempts
                    );
                    if !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Errors worth waiting for: locks and access refusals that another process
/// may release.
pub fn is_transient(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied || crate::error::is_busy(err)
}
