//! Polling primitive for eventually-consistent state
//!
//! A probe is re-run at a fixed interval until it reports [`Probe::Ready`] or
//! the timeout elapses. A probe error aborts the poll immediately.
//!
//! # Example
//!
//! ```ignore
//! use hosted_e2e::eventually::{eventually, Probe};
//! use std::time::Duration;
//!
//! let cluster = eventually(|| async {
//!     let cluster = client.cluster_by_id(&id).await?;
//!     if cluster.is_active() {
//!         Ok(Probe::Ready(cluster))
//!     } else {
//!         Ok(Probe::Pending(cluster.state_description()))
//!     }
//! })
//! .timeout(Duration::from_secs(15 * 60))
//! .interval(Duration::from_secs(10))
//! .await_condition()
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Result of one probe
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// Condition met, carrying the observed value
    Ready(T),
    /// Not yet; description of what was observed
    Pending(String),
}

/// Error type for eventually operations
#[derive(Debug, thiserror::Error)]
pub enum ConditionError<E> {
    #[error("condition not met within {timeout:?} ({attempts} attempts over {elapsed:?}), last state: {last_state}")]
    EventuallyFailed {
        attempts: u32,
        elapsed: Duration,
        timeout: Duration,
        last_state: String,
    },

    #[error("probe failed on attempt {attempts}: {source}")]
    ProbeFailed {
        attempts: u32,
        #[source]
        source: E,
    },
}

/// Builder for eventually checks
pub struct Eventually<F> {
    probe: F,
    timeout: Duration,
    interval: Duration,
}

/// Create an eventually check that retries until the probe is ready
///
/// Default timeout: 30 seconds
/// Default interval: 250ms
pub fn eventually<F, Fut, T, E>(probe: F) -> Eventually<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
{
    Eventually {
        probe,
        timeout: Duration::from_secs(30),
        interval: Duration::from_millis(250),
    }
}

impl<F> Eventually<F> {
    /// Set the timeout duration
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the polling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the check, retrying until ready or timeout
    ///
    /// The final probe happens exactly at the timeout, so a condition that never
    /// holds fails after the configured window and not a full interval later.
    pub async fn await_condition<Fut, T, E>(mut self) -> Result<T, ConditionError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, E>>,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let last_state = match (self.probe)().await {
                Ok(Probe::Ready(value)) => return Ok(value),
                Ok(Probe::Pending(state)) => state,
                Err(source) => return Err(ConditionError::ProbeFailed { attempts, source }),
            };

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(ConditionError::EventuallyFailed {
                    attempts,
                    elapsed,
                    timeout: self.timeout,
                    last_state,
                });
            }

            sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }
}
