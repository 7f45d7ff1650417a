//! Request dispatcher.
//!
//! # Responsibilities
//! - Build the outbound request for a [`RequestDescriptor`]
//! - Run each attempt under its own effective cancellation token
//! - Classify failures and retry transient ones with linear backoff
//! - Decode the response into a [`Payload`] or a caller type

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::classify::{self, AttemptContext, AttemptFailure};
use crate::client::error::{ApiError, ErrorKind, Payload};
use crate::client::request::RequestDescriptor;
use crate::config::{validate_config, ClientConfig, ConfigError};
use crate::observability::metrics;
use crate::resilience::{is_retryable, linear_backoff, CancelCause, EffectiveAttempt, RetryBudget};

/// Header carrying the per-call correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Client for the portal API gateway.
///
/// Cheap to clone; clones share the configuration, connection pool and
/// cookie jar.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client from a configuration, validating it first.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(concat!("portal-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_http_client(config, http)
    }

    /// Create a client around an existing `reqwest` client.
    pub fn with_http_client(config: ClientConfig, http: reqwest::Client) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        tracing::debug!(base_url = %config.base_url(), "API client created");
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn shared_config(&self) -> Arc<ClientConfig> {
        self.config.clone()
    }

    /// The underlying HTTP client (shared connection pool and cookies).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Start a descriptor seeded with this client's defaults.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestDescriptor {
        RequestDescriptor::from_config(&self.config, method, path)
    }

    /// Perform a call and deserialize the payload into `T`.
    ///
    /// JSON bodies deserialize directly; text bodies deserialize as a JSON
    /// string, so `T = String` accepts them.
    pub async fn call<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Result<T, ApiError> {
        self.execute(descriptor, |payload, url| {
            payload.into_typed().map_err(|e| {
                tracing::warn!(url = %url, error = %e, "Response did not match the expected type");
                classify::malformed(url, &e)
            })
        })
        .await
    }

    /// Perform a call and return the decoded payload.
    pub async fn call_raw(&self, descriptor: &RequestDescriptor) -> Result<Payload, ApiError> {
        self.execute(descriptor, |payload, _| Ok(payload)).await
    }

    /// Run the retry loop, then `decode` the payload. The call's outcome is
    /// recorded once, after decoding.
    async fn execute<T, F>(&self, descriptor: &RequestDescriptor, decode: F) -> Result<T, ApiError>
    where
        F: FnOnce(Payload, &str) -> Result<T, ApiError>,
    {
        let start = Instant::now();
        let url = self.config.url_for(descriptor.path());
        let method = descriptor.method().as_str();

        let result = self
            .dispatch(descriptor, &url, start)
            .await
            .and_then(|payload| decode(payload, &url));

        metrics::record_request(method, outcome(&result), start);
        result
    }

    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        url: &str,
        start: Instant,
    ) -> Result<Payload, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let headers = outbound_headers(descriptor, &request_id).map_err(|reason| {
            tracing::warn!(url = %url, reason = %reason, "Rejected request headers");
            ApiError::new(
                ErrorKind::ClientError,
                format!("Request to {} has an invalid header: {}", url, reason),
                url,
            )
        })?;
        let mut budget = RetryBudget::new(descriptor.retry_budget(), self.config.retries.max_budget);
        let mut attempt_no: u32 = 0;

        loop {
            attempt_no += 1;
            tracing::debug!(
                request_id = %request_id,
                method = %descriptor.method(),
                url = %url,
                attempt = attempt_no,
                "Dispatching request"
            );

            let err = match self.attempt(descriptor, url, &headers).await {
                Ok(payload) => return Ok(payload),
                Err(err) => err,
            };

            if is_retryable(err.kind()) {
                if let Some(retry) = budget.try_consume() {
                    let delay = linear_backoff(retry, self.config.retries.base_delay());
                    tracing::info!(
                        request_id = %request_id,
                        attempt = attempt_no,
                        kind = %err.kind(),
                        status = ?err.status(),
                        delay = ?delay,
                        remaining = budget.remaining(),
                        "Retrying request"
                    );
                    metrics::record_retry(err.kind().as_str());

                    if !wait_or_cancelled(delay, descriptor.cancel_token()).await {
                        tracing::debug!(request_id = %request_id, url = %url, "Request cancelled during backoff");
                        return Err(classify::classify(
                            AttemptFailure::Cancelled(CancelCause::Caller),
                            &AttemptContext {
                                url,
                                base_url: self.config.base_url(),
                                budget: descriptor.timeout(),
                                elapsed: start.elapsed(),
                            },
                        ));
                    }
                    continue;
                }
            }

            match err.kind() {
                ErrorKind::Cancelled => {
                    tracing::debug!(request_id = %request_id, url = %url, "Request cancelled by caller")
                }
                kind => tracing::warn!(
                    request_id = %request_id,
                    url = %url,
                    kind = %kind,
                    status = ?err.status(),
                    attempts = attempt_no,
                    "Request failed"
                ),
            }
            return Err(err);
        }
    }

    /// One attempt: fresh deadline, fresh effective token.
    async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<Payload, ApiError> {
        let attempt = EffectiveAttempt::acquire(descriptor.cancel_token(), descriptor.timeout());

        let outcome = tokio::select! {
            biased;
            _ = attempt.token().cancelled() => {
                Err(AttemptFailure::Cancelled(attempt.cause().unwrap_or(CancelCause::Caller)))
            }
            result = self.exchange(descriptor, url, headers) => result,
        };

        let ctx = AttemptContext {
            url,
            base_url: self.config.base_url(),
            budget: attempt.budget(),
            elapsed: attempt.elapsed(),
        };
        attempt.release();

        outcome.map_err(|failure| classify::classify(failure, &ctx))
    }

    /// Send the request and read the whole body.
    async fn exchange(
        &self,
        descriptor: &RequestDescriptor,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<Payload, AttemptFailure> {
        let mut req = self
            .http
            .request(descriptor.method().clone(), url)
            .headers(headers.clone());
        if let Some(body) = descriptor.body() {
            req = req.json(body);
        }

        let response = req.send().await.map_err(AttemptFailure::Transport)?;
        let status = response.status();
        let content_type = content_type(response.headers());
        let body = response.bytes().await.map_err(AttemptFailure::Transport)?;

        if !status.is_success() {
            return Err(AttemptFailure::Status {
                status: status.as_u16(),
                payload: Payload::decode_lenient(content_type.as_deref(), &body),
            });
        }

        Payload::decode(content_type.as_deref(), &body).map_err(AttemptFailure::Malformed)
    }

    // --- Convenience wrappers ---

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(&self.request(Method::GET, path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let descriptor = self.request(Method::POST, path).with_body(self.encode(path, body)?);
        self.call(&descriptor).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let descriptor = self.request(Method::PUT, path).with_body(self.encode(path, body)?);
        self.call(&descriptor).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let descriptor = self.request(Method::PATCH, path).with_body(self.encode(path, body)?);
        self.call(&descriptor).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(&self.request(Method::DELETE, path)).await
    }

    /// Serialize an outbound body. A body that cannot be represented as JSON
    /// is the caller's fault and is reported as a client error without status.
    fn encode<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body).map_err(|e| {
            let url = self.config.url_for(path);
            ApiError::new(
                ErrorKind::ClientError,
                format!("Request body for {} could not be encoded: {}", url, e),
                url,
            )
        })
    }
}

/// Default headers with the caller's headers applied over them. A caller
/// header replaces the default of the same name.
fn outbound_headers(descriptor: &RequestDescriptor, request_id: &str) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if descriptor.method() != Method::GET {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    let request_id = HeaderValue::from_str(request_id).map_err(|e| e.to_string())?;
    headers.insert(X_REQUEST_ID, request_id);

    for (key, value) in descriptor.headers() {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| format!("'{}' is not a valid header name", key))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| format!("value of '{}' is not a valid header value", key))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Metric label for a finished call.
fn outcome<T>(result: &Result<T, ApiError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(err) => err.kind().as_str(),
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Sleep for `delay`. Returns false if `cancel` fired first.
async fn wait_or_cancelled(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}
