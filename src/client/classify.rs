//! Failure classification.
//!
//! Every way an attempt can fail maps to exactly one [`ErrorKind`]. There is
//! no catch-all: statuses outside the documented ranges are treated as fatal
//! server errors so they are surfaced without retrying.

use std::time::Duration;

use crate::client::error::{ApiError, ErrorKind, Payload};
use crate::resilience::CancelCause;

/// Remediation shown alongside network failures.
pub const NETWORK_HINT: &str =
    "Check that the gateway is running and reachable, and that cross-origin access is configured for this client.";

/// Why a single attempt did not produce a payload.
#[derive(Debug)]
pub enum AttemptFailure {
    /// The effective token was cancelled.
    Cancelled(CancelCause),
    /// The transport failed before a complete response was read.
    Transport(reqwest::Error),
    /// The gateway answered with a non-success status.
    Status { status: u16, payload: Option<Payload> },
    /// A success response could not be decoded.
    Malformed(serde_json::Error),
}

/// What the classifier needs to know about the attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    pub url: &'a str,
    pub base_url: &'a str,
    pub budget: Duration,
    pub elapsed: Duration,
}

/// Map an attempt failure to a typed error.
pub fn classify(failure: AttemptFailure, ctx: &AttemptContext<'_>) -> ApiError {
    match failure {
        AttemptFailure::Cancelled(CancelCause::Deadline) => timeout(ctx),
        AttemptFailure::Cancelled(CancelCause::Caller) => {
            ApiError::new(ErrorKind::Cancelled, format!("Request to {} was cancelled", ctx.url), ctx.url)
                .with_elapsed(ctx.elapsed)
        }
        AttemptFailure::Transport(err) if err.is_timeout() => timeout(ctx),
        AttemptFailure::Transport(err) if err.is_builder() => ApiError::new(
            ErrorKind::ClientError,
            format!("Request to {} could not be built: {}", ctx.url, err),
            ctx.url,
        )
        .with_elapsed(ctx.elapsed),
        AttemptFailure::Transport(err) => ApiError::new(
            ErrorKind::NetworkFailure,
            format!("Failed to reach API at {}: {}", ctx.base_url, err),
            ctx.url,
        )
        .with_hint(NETWORK_HINT)
        .with_elapsed(ctx.elapsed),
        AttemptFailure::Status { status, payload } => classify_status(status, payload, ctx.url),
        AttemptFailure::Malformed(err) => malformed(ctx.url, &err),
    }
}

/// Map a non-success status and its decoded body to a typed error.
pub fn classify_status(status: u16, payload: Option<Payload>, url: &str) -> ApiError {
    let kind = kind_for_status(status);
    ApiError::new(kind, format!("HTTP {} from {}", status, url), url)
        .with_status(status)
        .with_payload(payload)
}

/// Kind for a non-success status.
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        400..=499 => ErrorKind::ClientError,
        502..=504 => ErrorKind::RetryableServerError,
        _ => ErrorKind::FatalServerError,
    }
}

/// A success body that did not decode as the caller expected.
pub fn malformed(url: &str, err: &serde_json::Error) -> ApiError {
    ApiError::new(
        ErrorKind::MalformedResponse,
        format!("Response from {} could not be decoded: {}", url, err),
        url,
    )
}

fn timeout(ctx: &AttemptContext<'_>) -> ApiError {
    let elapsed = ctx.elapsed.max(ctx.budget);
    ApiError::new(
        ErrorKind::Timeout,
        format!(
            "Request to {} timed out after {}ms",
            ctx.url,
            ctx.budget.as_millis()
        ),
        ctx.url,
    )
    .with_elapsed(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AttemptContext<'static> {
        AttemptContext {
            url: "http://gw.local/auth/me",
            base_url: "http://gw.local",
            budget: Duration::from_millis(250),
            elapsed: Duration::from_millis(251),
        }
    }

    #[test]
    fn test_status_ranges() {
        assert_eq!(kind_for_status(400), ErrorKind::ClientError);
        assert_eq!(kind_for_status(401), ErrorKind::ClientError);
        assert_eq!(kind_for_status(499), ErrorKind::ClientError);
        assert_eq!(kind_for_status(502), ErrorKind::RetryableServerError);
        assert_eq!(kind_for_status(503), ErrorKind::RetryableServerError);
        assert_eq!(kind_for_status(504), ErrorKind::RetryableServerError);
        assert_eq!(kind_for_status(500), ErrorKind::FatalServerError);
        assert_eq!(kind_for_status(501), ErrorKind::FatalServerError);
        assert_eq!(kind_for_status(505), ErrorKind::FatalServerError);
        assert_eq!(kind_for_status(599), ErrorKind::FatalServerError);
        assert_eq!(kind_for_status(304), ErrorKind::FatalServerError);
    }

    #[test]
    fn test_deadline_is_timeout() {
        let err = classify(AttemptFailure::Cancelled(CancelCause::Deadline), &ctx());
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.message().contains("250ms"));
        assert!(err.message().contains("http://gw.local/auth/me"));
        assert!(err.elapsed().unwrap() >= Duration::from_millis(250));
    }

    #[test]
    fn test_caller_cancel_is_cancelled() {
        let err = classify(AttemptFailure::Cancelled(CancelCause::Caller), &ctx());
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(err.hint().is_none());
    }

    #[test]
    fn test_client_error_carries_payload() {
        let payload = Some(Payload::Json(serde_json::json!({"error": "not found"})));
        let err = classify(
            AttemptFailure::Status { status: 404, payload: payload.clone() },
            &ctx(),
        );
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.payload(), payload.as_ref());
        assert_eq!(err.url(), "http://gw.local/auth/me");
    }

    #[test]
    fn test_unbuildable_request_is_client_error() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(err.is_builder());

        let err = classify(AttemptFailure::Transport(err), &ctx());
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert_eq!(err.status(), None);
        assert!(err.hint().is_none());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_malformed() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = classify(AttemptFailure::Malformed(json_err), &ctx());
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(!err.is_retryable());
    }
}
