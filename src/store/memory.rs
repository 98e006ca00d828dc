//! In-memory point writer.
//!
//! Records every accepted point. Failures and latency can be injected, so
//! the consumer and the shutdown ordering can be exercised without a server.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{Point, PointWriter, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    points: Mutex<Vec<Point>>,
    write_delay: Option<Duration>,
    fail_next: AtomicUsize,
    attempts: AtomicUsize,
    close_calls: AtomicUsize,
    closed: AtomicBool,
    written: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write sleeps for `delay` before it is recorded.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// The next `n` writes fail with a server error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.points.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` points are stored. Returns false on timeout.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let written = self.written.notified();
            if self.len() >= n {
                return true;
            }
            if tokio::time::timeout_at(deadline, written).await.is_err() {
                return self.len() >= n;
            }
        }
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PointWriter for MemoryStore {
    async fn write(&self, point: &Point) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        if self.take_failure() {
            return Err(StoreError::Server {
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        self.points.lock().push(point.clone());
        self.written.notify_waiters();
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
