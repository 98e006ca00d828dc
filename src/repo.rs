//! Persistence consumer: turns each event into a point and writes it.
//!
//! Failures stop here. A point that can not be built or written is logged
//! and dropped; the bus and the collector never hear about it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::Instrument;

use crate::bus::{EventHandler, HandlerError};
use crate::event::DeviceEvent;
use crate::store::{Point, PointWriter, DEVICE_MEASUREMENT};
use crate::telemetry::{self, SpanExt, WriteSpan};

/// Subscriber name used when registering on the bus.
pub const SUBSCRIBER_NAME: &str = "persistence";

/// Outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub written: u64,
    pub point_errors: u64,
    pub write_errors: u64,
}

#[derive(Default)]
struct Counters {
    written: AtomicU64,
    point_errors: AtomicU64,
    write_errors: AtomicU64,
}

/// Writes one point per delivered event.
pub struct PersistenceConsumer {
    writer: Arc<dyn PointWriter>,
    counters: Counters,
}

impl PersistenceConsumer {
    pub fn new(writer: Arc<dyn PointWriter>) -> Self {
        Self {
            writer,
            counters: Counters::default(),
        }
    }

    pub fn writer(&self) -> &Arc<dyn PointWriter> {
        &self.writer
    }

    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            written: self.counters.written.load(Ordering::Relaxed),
            point_errors: self.counters.point_errors.load(Ordering::Relaxed),
            write_errors: self.counters.write_errors.load(Ordering::Relaxed),
        }
    }

    /// Build, stamp and write a point for `event`.
    pub async fn persist(&self, event: &DeviceEvent) {
        let point = match Point::from_event(event, Utc::now()) {
            Ok(point) => point,
            Err(e) => {
                self.counters.point_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(device = %event.source_id(), error = %e, "point create failed");
                return;
            }
        };

        let span = WriteSpan::new(event.source_id(), DEVICE_MEASUREMENT);
        let start = Instant::now();
        let result = self.writer.write(&point).instrument(span.clone()).await;
        let latency = start.elapsed();

        span.record_result(&result);
        span.record("latency_ms", telemetry::duration_ms(latency));
        telemetry::record_store_write(result.is_ok(), latency);

        match result {
            Ok(()) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                tracing::info!(device = %event.source_id(), "write success");
            }
            Err(e) => {
                self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    device = %event.source_id(),
                    error = %e,
                    transient = e.is_transient(),
                    "write failed"
                );
            }
        }
    }
}

#[async_trait]
impl EventHandler for PersistenceConsumer {
    async fn handle(&self, event: Arc<DeviceEvent>) -> Result<(), HandlerError> {
        self.persist(&event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_persist_counts_success() {
        let store = Arc::new(MemoryStore::new());
        let consumer = PersistenceConsumer::new(store.clone());

        consumer.persist(&DeviceEvent::from_pairs("A1", [("temp", 23.5)])).await;

        assert_eq!(store.len(), 1);
        assert_eq!(consumer.stats().written, 1);
    }

    #[tokio::test]
    async fn test_invalid_point_never_reaches_store() {
        let store = Arc::new(MemoryStore::new());
        let consumer = PersistenceConsumer::new(store.clone());

        consumer.persist(&DeviceEvent::from_pairs("A1", [("temp", f64::NAN)])).await;

        assert_eq!(store.attempts(), 0);
        assert_eq!(consumer.stats().point_errors, 1);
    }

    #[tokio::test]
    async fn test_handler_swallows_write_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(1);
        let consumer = PersistenceConsumer::new(store.clone());

        let event = Arc::new(DeviceEvent::from_pairs("A1", [("temp", 23.5)]));
        assert!(consumer.handle(event).await.is_ok());
        assert_eq!(consumer.stats().write_errors, 1);
        assert!(store.is_empty());
    }
}
