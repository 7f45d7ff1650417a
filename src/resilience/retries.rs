//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a classified failure is transient
//! - Track the per-request retry budget
//!
//! # Design Decisions
//! - Only `NetworkFailure`, `Timeout` and `RetryableServerError` are retried
//! - The requested budget is clamped to the configured ceiling
//! - The budget only ever decreases

use crate::client::ErrorKind;

/// Whether a failure of this kind may succeed on a fresh attempt.
pub fn is_retryable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::NetworkFailure | ErrorKind::Timeout | ErrorKind::RetryableServerError
    )
}

/// Remaining retries for one logical request.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    remaining: u32,
    used: u32,
}

impl RetryBudget {
    /// Create a budget of `requested` retries, never more than `ceiling`.
    pub fn new(requested: u32, ceiling: u32) -> Self {
        Self {
            remaining: requested.min(ceiling),
            used: 0,
        }
    }

    /// Consume one retry. Returns the 1-based retry number, or `None` when exhausted.
    pub fn try_consume(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.used += 1;
        Some(self.used)
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Retries consumed so far.
    pub fn used(&self) -> u32 {
        self.used
    }
}
