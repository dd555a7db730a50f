use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bounded-attempt retry with a fixed backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1 in practice.
    pub max_attempts: u32,
    /// Fixed wait before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Zero-delay policy, for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Attempts actually made; a zero ceiling still makes one attempt.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }

    /// Call `op` until it succeeds, fails with an error `is_transient` rejects,
    /// or the attempt ceiling is reached. `op` receives the 1-based attempt.
    ///
    /// On failure the error is paired with the number of attempts made; a
    /// transient error in that position means the ceiling was hit.
    pub fn run<T, E>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, (u32, E)> {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < attempts => {
                    debug!(attempt, attempts, backoff = ?self.backoff, "retrying after transient failure");
                    self.wait();
                    attempt += 1;
                }
                Err(err) => return Err((attempt, err)),
            }
        }
    }

    /// Sleep for the backoff interval. No-op for a zero backoff.
    pub fn wait(&self) {
        if !self.backoff.is_zero() {
            thread::sleep(self.backoff);
        }
    }
}
