//! Handle to an open push stream.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::stream::state::{StateMachine, StreamState};

pub(crate) type LineCallback = Box<dyn FnMut(String) + Send + 'static>;

/// Callback slot shared between the reader task and the handle. Emptied by
/// `close()`.
pub(crate) type CallbackSlot = Arc<Mutex<Option<LineCallback>>>;

/// Invoke the subscriber with one line. Returns false once the slot is empty.
pub(crate) fn deliver(slot: &CallbackSlot, line: String) -> bool {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_mut() {
        Some(callback) => {
            callback(line);
            true
        }
        None => false,
    }
}

/// An open (or reconnecting) push stream.
///
/// Dropping the handle closes the stream. After [`close`](Self::close)
/// returns, the callback is never invoked again.
///
/// `close()` waits for an in-flight callback to finish, so it must not be
/// called from inside the callback itself.
pub struct StreamConnection {
    url: String,
    cancel: CancellationToken,
    callback: CallbackSlot,
    state: Arc<StateMachine>,
    task: Option<JoinHandle<()>>,
}

impl StreamConnection {
    pub(crate) fn new(
        url: String,
        cancel: CancellationToken,
        callback: CallbackSlot,
        state: Arc<StateMachine>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            url,
            cancel,
            callback,
            state,
            task: Some(task),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> StreamState {
        self.state.current()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == StreamState::Closed
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Wait until the stream reaches `target` or `Closed`, returning the
    /// state reached.
    pub async fn wait_for(&self, target: StreamState) -> StreamState {
        let mut rx = self.state.subscribe();
        let reached = match rx
            .wait_for(|state| *state == target || *state == StreamState::Closed)
            .await
        {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        reached
    }

    /// Close the stream. Idempotent.
    pub fn close(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.cancel.cancel();
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(callback);
        task.abort();

        if let Err(e) = self.state.transition(StreamState::Closed) {
            tracing::debug!(url = %self.url, error = %e, "Ignoring transition on close");
        }
        tracing::info!(url = %self.url, "Stream closed");
    }
}

impl fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConnection")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.close();
    }
}
