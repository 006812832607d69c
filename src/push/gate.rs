//! Readiness gate for the external SDK
//!
//! Resolves at most once, to ready or failed, and remembers the resolution.
//! A caller that arrives after the SDK finished loading returns immediately
//! instead of waiting for a signal that already fired.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lifecycle of the external SDK
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "cause", rename_all = "lowercase")]
pub enum ReadinessState {
    #[default]
    Uninitialized,
    Initializing,
    /// Terminal; never reverts
    Ready,
    /// Terminal; carries the cause reported by the initializer
    Failed(String),
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReadinessState::Uninitialized => "uninitialized",
            ReadinessState::Initializing => "initializing",
            ReadinessState::Ready => "ready",
            ReadinessState::Failed(_) => "failed",
        }
    }

    fn outcome(&self) -> Option<ReadyOutcome> {
        match self {
            ReadinessState::Ready => Some(ReadyOutcome::Ready),
            ReadinessState::Failed(cause) => Some(ReadyOutcome::Failed(cause.clone())),
            ReadinessState::Uninitialized | ReadinessState::Initializing => None,
        }
    }
}

/// What a waiter learns from [`ReadinessGate::await_ready`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    Ready,
    Failed(String),
    TimedOut,
}

/// Exactly-once readiness signal shared by every clone
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<ReadinessState>>,
}

static GLOBAL_GATE: OnceLock<ReadinessGate> = OnceLock::new();

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ReadinessState::Uninitialized);
        Self { tx: Arc::new(tx) }
    }

    /// The process-wide gate
    pub fn global() -> &'static ReadinessGate {
        GLOBAL_GATE.get_or_init(ReadinessGate::new)
    }

    /// Current state, read without waiting
    pub fn state(&self) -> ReadinessState {
        self.tx.borrow().clone()
    }

    /// uninitialized -> initializing; no-op from any other state
    pub fn mark_initializing(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == ReadinessState::Uninitialized {
                *state = ReadinessState::Initializing;
                true
            } else {
                false
            }
        });
        if changed {
            debug!("SDK readiness: initializing");
        }
    }

    /// Resolve to ready and release every current and future waiter.
    pub fn mark_ready(&self) {
        let mut rejected = None;
        let changed = self.tx.send_if_modified(|state| match state {
            ReadinessState::Uninitialized | ReadinessState::Initializing => {
                *state = ReadinessState::Ready;
                true
            }
            ReadinessState::Ready => false,
            ReadinessState::Failed(cause) => {
                rejected = Some(cause.clone());
                false
            }
        });

        if changed {
            info!("SDK readiness: ready");
        } else if let Some(cause) = rejected {
            warn!("Ignoring ready signal, SDK already failed: {}", cause);
        }
    }

    /// Resolve to failed unless already resolved.
    pub fn mark_failed(&self, cause: impl Into<String>) {
        let cause = cause.into();
        let changed = self.tx.send_if_modified(|state| match state {
            ReadinessState::Uninitialized | ReadinessState::Initializing => {
                *state = ReadinessState::Failed(cause.clone());
                true
            }
            ReadinessState::Ready | ReadinessState::Failed(_) => false,
        });

        if changed {
            warn!("SDK readiness: failed ({})", cause);
        } else {
            debug!("Ignoring failure signal after resolution: {}", cause);
        }
    }

    /// Suspend until the gate resolves or `timeout` elapses.
    ///
    /// Safe to call any number of times, concurrently, before or after
    /// resolution. Without a timeout the wait is unbounded.
    pub async fn await_ready(&self, timeout: Option<Duration>) -> ReadyOutcome {
        let mut rx = self.tx.subscribe();

        let wait = async move {
            let outcome = match rx.wait_for(|state| state.outcome().is_some()).await {
                Ok(state) => state
                    .outcome()
                    .unwrap_or_else(|| ReadyOutcome::Failed("unresolved".to_string())),
                Err(_) => ReadyOutcome::Failed("readiness gate closed".to_string()),
            };
            outcome
        };

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!("SDK readiness wait timed out after {:?}", limit);
                    ReadyOutcome::TimedOut
                }
            },
            None => wait.await,
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUARD: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_late_waiter_returns_immediately() {
        let gate = ReadinessGate::new();
        gate.mark_ready();

        let outcome = tokio::time::timeout(GUARD, gate.await_ready(None))
            .await
            .expect("late waiter must not hang");
        assert_eq!(outcome, ReadyOutcome::Ready);
    }

    #[tokio::test]
    async fn test_repeated_waits_after_resolution() {
        let gate = ReadinessGate::new();
        gate.mark_ready();
        for _ in 0..5 {
            assert_eq!(gate.await_ready(None).await, ReadyOutcome::Ready);
        }
    }

    #[tokio::test]
    async fn test_early_waiters_all_released() {
        let gate = ReadinessGate::new();
        gate.mark_initializing();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move { gate.await_ready(None).await }));
        }

        tokio::task::yield_now().await;
        gate.mark_ready();

        for handle in handles {
            let outcome = tokio::time::timeout(GUARD, handle).await.unwrap().unwrap();
            assert_eq!(outcome, ReadyOutcome::Ready);
        }
    }

    #[tokio::test]
    async fn test_failure_releases_waiters() {
        let gate = ReadinessGate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_ready(None).await })
        };

        gate.mark_failed("script load error");

        let outcome = tokio::time::timeout(GUARD, waiter).await.unwrap().unwrap();
        assert_eq!(outcome, ReadyOutcome::Failed("script load error".to_string()));
        assert_eq!(
            gate.state(),
            ReadinessState::Failed("script load error".to_string())
        );
    }

    #[tokio::test]
    async fn test_timeout_when_never_resolved() {
        let gate = ReadinessGate::new();
        let outcome = gate.await_ready(Some(Duration::from_millis(20))).await;
        assert_eq!(outcome, ReadyOutcome::TimedOut);
        assert_eq!(gate.state(), ReadinessState::Uninitialized);
    }

    #[test]
    fn test_ready_is_never_retracted() {
        let gate = ReadinessGate::new();
        gate.mark_ready();
        gate.mark_failed("late failure");
        gate.mark_ready();
        assert_eq!(gate.state(), ReadinessState::Ready);
    }

    #[test]
    fn test_ready_after_failure_is_ignored() {
        let gate = ReadinessGate::new();
        gate.mark_initializing();
        gate.mark_failed("boom");
        gate.mark_ready();
        assert_eq!(gate.state(), ReadinessState::Failed("boom".to_string()));
    }

    #[test]
    fn test_initializing_only_from_uninitialized() {
        let gate = ReadinessGate::new();
        gate.mark_initializing();
        assert_eq!(gate.state(), ReadinessState::Initializing);

        gate.mark_ready();
        gate.mark_initializing();
        assert_eq!(gate.state(), ReadinessState::Ready);
    }

    #[test]
    fn test_global_gate_is_shared() {
        assert!(std::ptr::eq(ReadinessGate::global(), ReadinessGate::global()));
    }

    #[test]
    fn test_clones_share_state() {
        let gate = ReadinessGate::new();
        let other = gate.clone();
        other.mark_ready();
        assert!(gate.state().is_ready());
    }
}
