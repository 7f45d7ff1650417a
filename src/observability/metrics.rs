//! Metrics collection.
//!
//! # Metrics
//! - `portal_client_requests_total` (counter): logical calls by method, outcome
//! - `portal_client_request_duration_seconds` (histogram): call latency including retries
//! - `portal_client_retries_total` (counter): retries by failure kind
//! - `portal_client_stream_lines_total` (counter): lines delivered to subscribers
//! - `portal_client_stream_state_transitions_total` (counter): stream state changes
//!
//! Recording goes through the `metrics` facade; installing an exporter is
//! left to the embedding application.

use metrics::{counter, histogram};
use std::time::Instant;

/// Record a finished logical call. `outcome` is "ok" or an error kind.
pub fn record_request(method: &str, outcome: &'static str, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    counter!(
        "portal_client_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("portal_client_request_duration_seconds", "method" => method.to_string())
        .record(duration);
}

/// Record one retry caused by a failure of `kind`.
pub fn record_retry(kind: &'static str) {
    counter!("portal_client_retries_total", "kind" => kind).increment(1);
}

/// Record one line delivered to a stream subscriber.
pub fn record_stream_line() {
    counter!("portal_client_stream_lines_total").increment(1);
}

/// Record a stream state transition.
pub fn record_stream_transition(to: &'static str) {
    counter!("portal_client_stream_state_transitions_total", "to" => to).increment(1);
}
