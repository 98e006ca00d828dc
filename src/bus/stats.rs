//! Delivery counters for the event bus.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared between the bus and its dispatch workers.
#[derive(Debug, Default)]
pub struct BusStats {
    published: AtomicU64,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`BusStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusStatsSnapshot {
    /// Events accepted by `publish`.
    pub published: u64,
    /// Per-subscriber deliveries queued.
    pub enqueued: u64,
    /// Handler calls that returned `Ok`.
    pub delivered: u64,
    /// Handler calls that returned an error.
    pub failed: u64,
    /// Handler calls that panicked.
    pub panicked: u64,
    /// Per-subscriber deliveries lost to a full queue.
    pub dropped: u64,
    /// Events published after the bus was closed.
    pub rejected: u64,
    pub in_flight: u32,
}

impl BusStats {
    pub(super) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, in_flight: u32) -> BusStatsSnapshot {
        BusStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            in_flight,
        }
    }
}
