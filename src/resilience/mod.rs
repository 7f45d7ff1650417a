//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to gateway:
//!     → timeouts.rs (compose caller token + deadline into one effective token)
//!     → On failure: retries.rs (check if retryable, consume budget)
//!     → backoff.rs (linear wait before the next attempt)
//!
//! Push stream drop:
//!     → backoff.rs (exponential reconnect delay with jitter)
//! ```
//!
//! # Design Decisions
//! - Every attempt has its own deadline; none outlives the attempt
//! - Retries are strictly sequential for one request
//! - Client errors are never retried

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::{calculate_backoff, linear_backoff};
pub use retries::{is_retryable, RetryBudget};
pub use timeouts::{CancelCause, EffectiveAttempt};
