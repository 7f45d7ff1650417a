//! Stream connection state machine.

use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

use crate::observability::metrics;

/// Lifecycle of a push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Connecting (or reconnecting).
    Opening,
    /// Connected and receiving frames.
    Open,
    /// Waiting before the next reconnection.
    Backoff,
    /// Terminal.
    Closed,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Opening => "opening",
            StreamState::Open => "open",
            StreamState::Backoff => "backoff",
            StreamState::Closed => "closed",
        }
    }

    /// Whether `self -> next` is an allowed edge.
    pub fn can_transition_to(self, next: StreamState) -> bool {
        use StreamState::*;
        matches!(
            (self, next),
            (Opening, Open)
                | (Opening, Backoff)
                | (Opening, Closed)
                | (Open, Backoff)
                | (Open, Closed)
                | (Backoff, Opening)
                | (Backoff, Closed)
                | (Closed, Closed)
        )
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for stream operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("invalid stream transition from {from} to {to}")]
    InvalidTransition { from: StreamState, to: StreamState },
}

/// Shared state holder. The reader task drives it; the connection handle
/// observes it and forces `Closed`.
#[derive(Debug)]
pub(crate) struct StateMachine {
    url: String,
    tx: watch::Sender<StreamState>,
}

impl StateMachine {
    pub(crate) fn new(url: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(StreamState::Opening);
        Self { url: url.into(), tx }
    }

    pub(crate) fn current(&self) -> StreamState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.tx.subscribe()
    }

    /// Move to `next`. `Closed -> Closed` is accepted without notifying.
    pub(crate) fn transition(&self, next: StreamState) -> Result<(), StreamError> {
        let mut outcome = Ok(None);
        self.tx.send_if_modified(|current| {
            if !current.can_transition_to(next) {
                outcome = Err(StreamError::InvalidTransition { from: *current, to: next });
                return false;
            }
            if *current == next {
                return false;
            }
            outcome = Ok(Some(*current));
            *current = next;
            true
        });

        if let Some(from) = outcome? {
            tracing::debug!(url = %self.url, from = %from, to = %next, "Stream state changed");
            metrics::record_stream_transition(next.as_str());
        }
        Ok(())
    }
}
