//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or environment
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → shared via Arc by ApiClient and StreamConsumer
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; reconfiguring means building a new client
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ApiConfig, ClientConfig, ObservabilityConfig, RetryConfig, StreamConfig, TimeoutConfig,
    DEFAULT_API_BASE,
};
pub use validation::{validate_config, ValidationError};
