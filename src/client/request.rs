//! Request descriptors.

use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;

/// Everything needed to perform one logical API call.
///
/// Built with the `with_*` methods, then handed to
/// [`ApiClient::call`](crate::client::ApiClient::call) by reference, so it
/// cannot change while the call is in flight.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    body: Option<Value>,
    headers: Vec<(String, String)>,
    timeout: Duration,
    retry_budget: u32,
    cancel: Option<CancellationToken>,
}

impl RequestDescriptor {
    /// A descriptor using the built-in defaults (15s deadline, one retry).
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::from_config(&ClientConfig::default(), method, path)
    }

    /// A descriptor using the deadline and retry budget defaults of `config`.
    pub fn from_config(config: &ClientConfig, method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            timeout: config.timeouts.request(),
            retry_budget: config.retries.default_budget,
            cancel: None,
        }
    }

    /// Set the JSON body. Ignored for GET requests.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header, applied after the client's defaults.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Per-attempt deadline. Zero disables the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries allowed after the first failed attempt.
    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = retries;
        self
    }

    /// Token the caller can cancel to abort the call.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The body that will be sent, if any.
    pub fn body(&self) -> Option<&Value> {
        if self.method == Method::GET {
            None
        } else {
            self.body.as_ref()
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }
}
