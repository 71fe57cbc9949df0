//! Caller-side retry policy for firmware "try again" answers.
//!
//! The protocol layer never loops on its own. Callers that want to ride out
//! status 0xA6 wrap an operation in a [`RetryPolicy`].

use crate::error::Result;
use log::warn;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    /// A single attempt
    fn default() -> Self {
        RetryPolicy {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        RetryPolicy { attempts, backoff }
    }

    /// Run `op`, re-running it only while it fails as retryable.
    ///
    /// Any other error, or the last retryable one, is returned unchanged.
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Firmware busy (attempt {}/{}), retrying in {:?}",
                        attempt, attempts, self.backoff
                    );
                    thread::sleep(self.backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
