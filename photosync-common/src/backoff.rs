//! Exponential retry policy for server calls
//!
//! Delays grow as `initial_delay * factor^attempt`, capped at `max_delay`.
//! Only errors the caller classifies as transient are retried.

use crate::Error;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry policy object attached to a server client
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            factor: 3.5,
            max_attempts: 5,
        }
    }
}

impl ExponentialBackoff {
    /// Delay to wait after the failed attempt number `attempt` (0-based)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * self.factor.powi(attempt as i32);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts
    ///
    /// # Arguments
    /// * `cancel` - Run cancellation token; a cancelled wait returns `Error::Cancelled`
    /// * `op` - Operation factory, called once per attempt
    /// * `is_transient` - Classifier deciding whether an error deserves another attempt
    ///
    /// # Returns
    /// The first success, or the last error once attempts are exhausted
    pub async fn retry<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        is_transient: impl Fn(&E) -> bool,
    ) -> std::result::Result<T, E>
    where
        E: From<Error> + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled.into());
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt + 1 < self.max_attempts => {
                    let delay = self.next_delay(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled.into()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
