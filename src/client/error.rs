//! Typed failures surfaced by the client.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Closed set of failure kinds a caller can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The attempt's deadline elapsed before a response arrived.
    Timeout,
    /// The gateway could not be reached (DNS, refused connection, reset).
    NetworkFailure,
    /// The gateway rejected the request (4xx).
    ClientError,
    /// Transient gateway failure (502, 503, 504).
    RetryableServerError,
    /// Any other 5xx or unexpected status.
    FatalServerError,
    /// The caller cancelled the request.
    Cancelled,
    /// A success response whose body could not be decoded.
    MalformedResponse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkFailure => "network_failure",
            ErrorKind::ClientError => "client_error",
            ErrorKind::RetryableServerError => "retryable_server_error",
            ErrorKind::FatalServerError => "fatal_server_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Decode a success body: JSON when the content type says so, text otherwise.
    pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Self, serde_json::Error> {
        if is_json(content_type) {
            serde_json::from_slice(body).map(Payload::Json)
        } else {
            Ok(Payload::Text(String::from_utf8_lossy(body).into_owned()))
        }
    }

    /// Decode an error body. Never fails: unparseable JSON falls back to text,
    /// and an empty body yields `None`.
    pub fn decode_lenient(content_type: Option<&str>, body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        match Self::decode(content_type, body) {
            Ok(payload) => Some(payload),
            Err(_) => Some(Payload::Text(String::from_utf8_lossy(body).into_owned())),
        }
    }

    /// Convert into a caller type. Text bodies deserialize as a JSON string.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            Payload::Json(value) => serde_json::from_value(value),
            Payload::Text(text) => serde_json::from_value(Value::String(text)),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Json(_) => None,
            Payload::Text(t) => Some(t),
        }
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}

/// A classified client failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    payload: Option<Payload>,
    url: String,
    hint: Option<String>,
    elapsed: Option<Duration>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            payload: None,
            url: url.into(),
            hint: None,
            elapsed: None,
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn with_payload(mut self, payload: Option<Payload>) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub(crate) fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status, for failures that carry a response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Decoded response body, for failures that carry a response.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Target URL of the failed request.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Human-readable remediation hint, kept out of `message`.
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Time spent in the attempt that failed.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn is_retryable(&self) -> bool {
        crate::resilience::is_retryable(self.kind)
    }

    /// A 401 rejection, which login flows report as bad credentials.
    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::ClientError && self.status == Some(401)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_decode_json_and_text() {
        let json = Payload::decode(Some("application/json; charset=utf-8"), br#"{"ok":true}"#).unwrap();
        assert_eq!(json.as_json(), Some(&serde_json::json!({"ok": true})));

        let text = Payload::decode(Some("text/plain"), b"pong").unwrap();
        assert_eq!(text.as_text(), Some("pong"));

        let untyped = Payload::decode(None, b"raw").unwrap();
        assert_eq!(untyped, Payload::Text("raw".into()));
    }

    #[test]
    fn test_decode_invalid_json_fails() {
        assert!(Payload::decode(Some("application/json"), b"{oops").is_err());
    }

    #[test]
    fn test_lenient_decode_falls_back_to_text() {
        let p = Payload::decode_lenient(Some("application/json"), b"<html>bad gateway</html>");
        assert_eq!(p, Some(Payload::Text("<html>bad gateway</html>".into())));
        assert_eq!(Payload::decode_lenient(Some("application/json"), b""), None);
    }

    #[test]
    fn test_into_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct User {
            id: String,
        }

        let user: User = Payload::Json(serde_json::json!({"id": "7"})).into_typed().unwrap();
        assert_eq!(user, User { id: "7".into() });

        let text: String = Payload::Text("hello".into()).into_typed().unwrap();
        assert_eq!(text, "hello");

        assert!(Payload::Text("hello".into()).into_typed::<User>().is_err());
    }

    #[test]
    fn test_unauthorized() {
        let err = ApiError::new(ErrorKind::ClientError, "HTTP 401", "http://x/auth/login").with_status(401);
        assert!(err.is_unauthorized());
        assert!(!err.is_retryable());

        let err = ApiError::new(ErrorKind::ClientError, "HTTP 403", "http://x/me").with_status(403);
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_display_excludes_hint() {
        let err = ApiError::new(ErrorKind::NetworkFailure, "Failed to reach API at http://gw", "http://gw/a")
            .with_hint("Is the gateway running?");
        assert_eq!(err.to_string(), "network_failure: Failed to reach API at http://gw");
        assert_eq!(err.hint(), Some("Is the gateway running?"));
    }
}
