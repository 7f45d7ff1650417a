//! Portal API client library.
//!
//! Request/response calls to the patient portal gateway with per-attempt
//! deadlines, caller cancellation, bounded retries and a closed error
//! taxonomy, plus a Server-Sent Events consumer for push streams.

pub mod client;
pub mod config;
pub mod gateway;
pub mod observability;
pub mod resilience;
pub mod stream;

pub use client::{ApiClient, ApiError, ErrorKind, Payload, RequestDescriptor};
pub use config::schema::ClientConfig;
pub use gateway::GatewayClient;
pub use stream::{StreamConnection, StreamConsumer, StreamState};
