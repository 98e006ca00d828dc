//! Shutdown coordination for the ingest pipeline.
//!
//! The coordinator owns the process-wide cancellation token and a small
//! state machine. [`InFlightTracker`] counts deliveries that are queued or
//! running so the stop phase can wait for them before the store is closed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a bounded wait for work to finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

impl ShutdownResult {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Owns the cancellation signal and the running/draining/stopped state.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Child token for a component loop. Cancelled by [`begin`](Self::begin).
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Stop accepting work and cancel every child token.
    ///
    /// Returns false if shutdown was already in progress.
    pub fn begin(&self) -> bool {
        {
            let mut state = self.state.write();
            if *state != ShutdownState::Running {
                return false;
            }
            *state = ShutdownState::Draining;
        }
        self.token.cancel();
        true
    }

    pub fn finish(&self) {
        *self.state.write() = ShutdownState::Stopped;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts in-flight work items and wakes waiters when one completes.
#[derive(Clone, Default)]
pub struct InFlightTracker {
    count: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            counter: self.count.clone(),
            notify: self.notify.clone(),
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no guard is alive, or until `timeout` elapses.
    pub async fn wait_idle(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let count = self.count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return ShutdownResult::Timeout { remaining: count };
            }

            tokio::select! {
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep(remaining_time) => {
                    let final_count = self.count();
                    if final_count == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining: final_count };
                }
            }
        }
    }
}

/// RAII guard for one in-flight item.
pub struct InFlightGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}
