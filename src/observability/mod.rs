//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher / stream consumer produce:
//!     → tracing events (attempts, retries, classifications, state changes)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stderr) in the CLI
//!     → whatever metrics recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - Structured fields, not formatted strings, for machine parsing
//! - The request ID is logged with every attempt of a call
//! - The library never installs global state on its own

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
