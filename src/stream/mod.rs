//! Push stream (Server-Sent Events) consumer.
//!
//! # Data Flow
//! ```text
//! StreamConsumer::open(path, on_line)
//!     → consumer.rs reader task (GET, Accept: text/event-stream)
//!         → parser.rs (bytes → events)
//!         → on_line(data) for each message event, in order
//!     → state.rs (Opening → Open → Backoff → Opening ... → Closed)
//! StreamConnection::close() / drop
//!     → cancel reader, empty callback slot, Closed
//! ```
//!
//! # Design Decisions
//! - Reconnection backoff is exponential with jitter; a server `retry:` wins
//! - `Last-Event-ID` is sent on reconnection; frames are not deduplicated
//! - Rejections (non-2xx, 204, wrong content type) close the stream for good

pub mod connection;
pub mod consumer;
pub mod parser;
pub mod state;

pub use connection::StreamConnection;
pub use consumer::{StreamConsumer, LAST_EVENT_ID};
pub use parser::{SseEvent, SseParser};
pub use state::{StreamError, StreamState};
