//! Rich wait errors with debugging context
//!
//! Reports which field of which cluster never converged, what was expected,
//! and what was last observed.
//!
//! # Example
//!
//! ```ignore
//! match scale_node_pools::<Ack>(&client, cluster, 4, Verification::full()).await {
//!     Err(OperationError::WaitTimeout(err)) => {
//!         println!("Cluster: {}", err.cluster);
//!         println!("Field: {}", err.field);
//!         println!("Expected: {}", err.expected);
//!         println!("Last observed: {}", err.actual);
//!     }
//!     _ => {}
//! }
//! ```

use std::fmt;
use std::time::Duration;

/// Rich error context for convergence waits
#[derive(Debug, Clone, PartialEq)]
pub struct WaitError {
    /// Cluster reference (e.g. "c-abcde")
    pub cluster: String,
    /// Field being polled (e.g. "ackStatus.upstreamSpec.kubernetesVersion")
    pub field: String,
    /// Value the field should reach
    pub expected: String,
    /// Last observed value
    pub actual: String,
    /// How long we waited before giving up
    pub elapsed: Duration,
    /// The timeout that was configured
    pub timeout: Duration,
    /// Number of fetches performed
    pub attempts: u32,
}

impl WaitError {
    /// Create a new WaitError
    pub fn new(
        cluster: impl Into<String>,
        field: impl Into<String>,
        timeout: Duration,
        elapsed: Duration,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            field: field.into(),
            expected: "unknown".to_string(),
            actual: "unknown".to_string(),
            elapsed,
            timeout,
            attempts: 0,
        }
    }

    /// Set the expected value
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = expected.into();
        self
    }

    /// Set the last observed value
    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = actual.into();
        self
    }

    /// Set the number of attempts
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Wait timeout for {} on cluster {}", self.field, self.cluster)?;
        writeln!(f, "├─ Expected: {}", self.expected)?;
        writeln!(f, "├─ Last observed: {}", self.actual)?;
        writeln!(f, "├─ Attempts: {}", self.attempts)?;
        writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
        writeln!(f, "└─ Timeout: {:?}", self.timeout)?;
        Ok(())
    }
}

impl std::error::Error for WaitError {}
