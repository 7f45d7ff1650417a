//! Per-attempt deadline and cancellation composition.
//!
//! # Responsibilities
//! - Combine the caller's cancellation token with an internal deadline
//! - Record which of the two fired first
//! - Tear the deadline down exactly once when the attempt ends
//!
//! # Design Decisions
//! - Uses Tokio's timer facilities; one watcher task per attempt
//! - A zero budget creates no timer at all
//! - Release is explicit but also runs on drop, so early returns cannot leak the timer

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CAUSE_NONE: u8 = 0;
const CAUSE_DEADLINE: u8 = 1;
const CAUSE_CALLER: u8 = 2;

/// Why an effective token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The attempt's deadline elapsed.
    Deadline,
    /// The caller-supplied token was cancelled.
    Caller,
}

/// One network attempt's cancellation scope.
#[derive(Debug)]
pub struct EffectiveAttempt {
    token: CancellationToken,
    caller: Option<CancellationToken>,
    cause: Arc<AtomicU8>,
    watcher: Option<JoinHandle<()>>,
    budget: Duration,
    started: Instant,
    released: bool,
}

impl EffectiveAttempt {
    /// Start an attempt.
    ///
    /// With a non-zero `budget` a watcher task cancels the effective token
    /// when either the deadline elapses or `caller` is cancelled. With a zero
    /// budget the effective token simply follows `caller` (or never cancels).
    /// Must be called from within a Tokio runtime.
    pub fn acquire(caller: Option<&CancellationToken>, budget: Duration) -> Self {
        let token = match caller {
            Some(c) => c.child_token(),
            None => CancellationToken::new(),
        };
        let cause = Arc::new(AtomicU8::new(CAUSE_NONE));

        let watcher = if budget.is_zero() {
            None
        } else {
            let effective = token.clone();
            let caller = caller.cloned();
            let cause = cause.clone();
            Some(tokio::spawn(async move {
                let caller_cancelled = async {
                    match &caller {
                        Some(c) => c.cancelled().await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    biased;
                    _ = caller_cancelled => {
                        let _ = cause.compare_exchange(CAUSE_NONE, CAUSE_CALLER, Ordering::SeqCst, Ordering::SeqCst);
                    }
                    _ = tokio::time::sleep(budget) => {
                        let _ = cause.compare_exchange(CAUSE_NONE, CAUSE_DEADLINE, Ordering::SeqCst, Ordering::SeqCst);
                        effective.cancel();
                    }
                }
            }))
        };

        Self {
            token,
            caller: caller.cloned(),
            cause,
            watcher,
            budget,
            started: Instant::now(),
            released: false,
        }
    }

    /// The effective token for this attempt.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Why the effective token was cancelled, if it was.
    pub fn cause(&self) -> Option<CancelCause> {
        match self.cause.load(Ordering::SeqCst) {
            CAUSE_DEADLINE => Some(CancelCause::Deadline),
            CAUSE_CALLER => Some(CancelCause::Caller),
            _ if self.caller.as_ref().is_some_and(|c| c.is_cancelled()) => {
                Some(CancelCause::Caller)
            }
            _ => None,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time since the attempt started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the deadline timer is still armed.
    pub fn has_deadline(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// End the attempt, disarming the deadline.
    pub fn release(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for EffectiveAttempt {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_cancels_token() {
        let attempt = EffectiveAttempt::acquire(None, Duration::from_millis(30));
        attempt.token().cancelled().await;
        assert_eq!(attempt.cause(), Some(CancelCause::Deadline));
        assert!(attempt.elapsed() >= Duration::from_millis(30));
        attempt.release();
    }

    #[tokio::test]
    async fn test_caller_cancels_token() {
        let caller = CancellationToken::new();
        let attempt = EffectiveAttempt::acquire(Some(&caller), Duration::from_secs(10));
        caller.cancel();
        attempt.token().cancelled().await;
        assert_eq!(attempt.cause(), Some(CancelCause::Caller));
    }

    #[tokio::test]
    async fn test_zero_budget_follows_caller_only() {
        let caller = CancellationToken::new();
        let attempt = EffectiveAttempt::acquire(Some(&caller), Duration::ZERO);
        assert!(!attempt.has_deadline());
        assert_eq!(attempt.cause(), None);

        caller.cancel();
        assert!(attempt.token().is_cancelled());
        assert_eq!(attempt.cause(), Some(CancelCause::Caller));
    }

    #[tokio::test]
    async fn test_zero_budget_without_caller_never_cancels() {
        let attempt = EffectiveAttempt::acquire(None, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!attempt.token().is_cancelled());
        assert_eq!(attempt.cause(), None);
    }

    #[tokio::test]
    async fn test_release_disarms_deadline() {
        let attempt = EffectiveAttempt::acquire(None, Duration::from_millis(20));
        let token = attempt.token().clone();
        assert!(attempt.has_deadline());
        attempt.release();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_disarms_deadline() {
        let token = {
            let attempt = EffectiveAttempt::acquire(None, Duration::from_millis(20));
            attempt.token().clone()
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_after_release_is_noop() {
        let caller = CancellationToken::new();
        let attempt = EffectiveAttempt::acquire(Some(&caller), Duration::from_secs(1));
        attempt.release();
        caller.cancel();
    }
}
