//! Push stream consumer.
//!
//! One reader task per connection. The task owns the HTTP response and the
//! parser; the [`StreamConnection`] handle owns the cancellation token and
//! the callback slot.

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;
use crate::config::{validate_config, ClientConfig, ConfigError};
use crate::observability::metrics;
use crate::resilience::calculate_backoff;
use crate::stream::connection::{deliver, CallbackSlot, LineCallback, StreamConnection};
use crate::stream::parser::SseParser;
use crate::stream::state::{StateMachine, StreamState};

/// Header carrying the last event ID on reconnection.
pub const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Opens push streams against the gateway.
#[derive(Debug, Clone)]
pub struct StreamConsumer {
    config: Arc<ClientConfig>,
    http: reqwest::Client,
}

/// How one connection ended.
#[derive(Debug)]
enum SessionEnd {
    /// Transport error or end of body. Reconnect.
    Dropped(String),
    /// The server refused the stream or the subscriber went away. Stop.
    Rejected(String),
}

impl StreamConsumer {
    /// Create a consumer with its own connection pool.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(concat!("portal-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Share an API client's configuration, pool and cookie jar.
    pub fn from_client(client: &ApiClient) -> Self {
        Self {
            config: client.shared_config(),
            http: client.http().clone(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to the stream at `path`. Each message event's data is
    /// passed to `on_line` in arrival order.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<F>(&self, path: &str, on_line: F) -> StreamConnection
    where
        F: FnMut(String) + Send + 'static,
    {
        let url = self.config.url_for(path);
        let callback: LineCallback = Box::new(on_line);
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(callback)));
        let state = Arc::new(StateMachine::new(url.clone()));
        let cancel = CancellationToken::new();

        tracing::info!(url = %url, "Opening stream");

        let reader = Reader {
            http: self.http.clone(),
            config: self.config.clone(),
            url: url.clone(),
            slot: slot.clone(),
            state: state.clone(),
            parser: SseParser::new(),
        };
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_cancel.cancelled() => {}
                _ = reader.run() => {}
            }
        });

        StreamConnection::new(url, cancel, slot, state, task)
    }
}

struct Reader {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    url: String,
    slot: CallbackSlot,
    state: Arc<StateMachine>,
    parser: SseParser,
}

impl Reader {
    async fn run(mut self) {
        // `failures` drives the backoff exponent and resets once a connection
        // opens; `reconnects` is what `max_reconnects` bounds.
        let mut failures: u32 = 0;
        let mut reconnects: u32 = 0;

        loop {
            let reason = match self.session(&mut failures).await {
                SessionEnd::Rejected(reason) => {
                    tracing::warn!(url = %self.url, reason = %reason, "Stream rejected, not reconnecting");
                    self.set_state(StreamState::Closed);
                    return;
                }
                SessionEnd::Dropped(reason) => reason,
            };

            failures = failures.saturating_add(1);
            reconnects = reconnects.saturating_add(1);
            if let Some(max) = self.config.stream.max_reconnects {
                if reconnects > max {
                    tracing::warn!(
                        url = %self.url,
                        reason = %reason,
                        reconnects = max,
                        "Stream reconnect limit reached"
                    );
                    self.set_state(StreamState::Closed);
                    return;
                }
            }

            let delay = self.reconnect_delay(failures);
            tracing::info!(
                url = %self.url,
                reason = %reason,
                attempt = reconnects,
                delay = ?delay,
                "Stream dropped, reconnecting"
            );
            self.set_state(StreamState::Backoff);
            tokio::time::sleep(delay).await;
            self.set_state(StreamState::Opening);
        }
    }

    /// One connection: open, then feed the parser until the body ends.
    async fn session(&mut self, failures: &mut u32) -> SessionEnd {
        self.parser.reset();

        let mut req = self
            .http
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = self.parser.last_event_id() {
            req = req.header(LAST_EVENT_ID, id);
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => return SessionEnd::Dropped(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT || !status.is_success() {
            return SessionEnd::Rejected(format!("HTTP {}", status));
        }
        if !is_event_stream(response.headers()) {
            return SessionEnd::Rejected("response is not text/event-stream".to_string());
        }

        self.set_state(StreamState::Open);
        *failures = 0;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return SessionEnd::Dropped(e.to_string()),
            };

            for event in self.parser.feed(&chunk) {
                if !event.is_message() {
                    tracing::trace!(url = %self.url, event = ?event.event, "Skipping typed event");
                    continue;
                }
                if !deliver(&self.slot, event.data) {
                    return SessionEnd::Rejected("subscriber closed".to_string());
                }
                metrics::record_stream_line();
            }
        }

        SessionEnd::Dropped("stream ended".to_string())
    }

    fn reconnect_delay(&self, failures: u32) -> Duration {
        let stream = &self.config.stream;
        match self.parser.retry() {
            Some(retry) => {
                let base = retry.as_millis() as u64;
                calculate_backoff(failures, base, base.max(stream.reconnect_max_ms))
            }
            None => calculate_backoff(failures, stream.reconnect_base_ms, stream.reconnect_max_ms),
        }
    }

    fn set_state(&self, next: StreamState) {
        if let Err(e) = self.state.transition(next) {
            tracing::debug!(url = %self.url, error = %e, "Stream state unchanged");
        }
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false)
}
