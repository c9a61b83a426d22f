//! Saga configuration.

use std::time::Duration;

/// Settings the circulation saga is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaConfig {
    /// How long a checkout runs before it is due.
    pub loan_period: chrono::Duration,
    /// Upper bound on each compensation, independent of the caller's
    /// deadline.
    pub compensation_timeout: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            loan_period: chrono::Duration::days(14),
            compensation_timeout: Duration::from_secs(2),
        }
    }
}
