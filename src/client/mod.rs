//! Gateway request/response client.
//!
//! # Data Flow
//! ```text
//! caller
//!     → request.rs (RequestDescriptor: method, path, body, deadline, retry budget)
//!     → dispatcher.rs (ApiClient::call)
//!         → resilience::timeouts (effective token per attempt)
//!         → network
//!         → classify.rs (failure → ErrorKind)
//!         → resilience::retries (retry or surface)
//!     → Payload / caller type, or ApiError
//! ```
//!
//! # Design Decisions
//! - Every failure leaving this module is an `ApiError`
//! - Retries reuse the descriptor and request ID but never the attempt
//! - Cookies are always sent; the gateway owns authentication

pub mod classify;
pub mod dispatcher;
pub mod error;
pub mod request;

pub use dispatcher::{ApiClient, X_REQUEST_ID};
pub use error::{ApiError, ErrorKind, Payload};
pub use request::RequestDescriptor;
