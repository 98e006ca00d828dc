//! In-process event bus.
//!
//! Subscribers are registered on an [`EventBusBuilder`] and frozen when the
//! bus is built. Each subscriber gets its own bounded queue and dispatch
//! worker, so a slow or failing subscriber never blocks the publisher or
//! the other subscribers.
//!
//! Delivery is best effort: a full queue drops the newest event for that
//! subscriber only, and nothing is replayed.
//!
//! ```
//! use std::time::Duration;
//!
//! use device_ingest::bus::{handler_fn, BusConfig, EventBus};
//! use device_ingest::event::DeviceEvent;
//!
//! # tokio_test::block_on(async {
//! let bus = EventBus::builder(BusConfig::default())
//!     .subscribe(
//!         "printer",
//!         handler_fn(|event| async move {
//!             println!("{} {:?}", event.source_id(), event.readings());
//!             Ok(())
//!         }),
//!     )
//!     .build();
//!
//! bus.publish(DeviceEvent::from_pairs("A1", [("temp", 23.5)]));
//! assert!(bus.drain(Duration::from_secs(1)).await.is_complete());
//! # });
//! ```

mod dispatch;
mod stats;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::event::DeviceEvent;
use crate::shutdown::{InFlightTracker, ShutdownResult};
use crate::telemetry;

pub use stats::{BusStats, BusStatsSnapshot};

use dispatch::Delivery;

/// Error a handler reports for one event.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A unit of logic that receives every published event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<DeviceEvent>) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<DeviceEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, event: Arc<DeviceEvent>) -> Result<(), HandlerError> {
        (self.0)(event).await
    }
}

/// Wrap an async closure as an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<DeviceEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Bus tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Queue bound per subscriber.
    pub queue_capacity: usize,
    /// Handler calls allowed to run at once per subscriber.
    pub max_concurrency: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            max_concurrency: 4,
        }
    }
}

struct Registration {
    name: String,
    handler: Arc<dyn EventHandler>,
}

/// Collects subscribers before the bus starts.
pub struct EventBusBuilder {
    config: BusConfig,
    registrations: Vec<Registration>,
}

impl EventBusBuilder {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            registrations: Vec::new(),
        }
    }

    /// Append a subscriber. Registration order carries no delivery guarantee.
    pub fn subscribe(mut self, name: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.registrations.push(Registration {
            name: name.into(),
            handler,
        });
        self
    }

    pub fn subscriber_count(&self) -> usize {
        self.registrations.len()
    }

    /// Freeze the registry and spawn one dispatch worker per subscriber.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> EventBus {
        let queue_capacity = self.config.queue_capacity.max(1);
        let max_concurrency = self.config.max_concurrency.max(1);
        let stats = Arc::new(BusStats::default());

        let mut queues = Vec::with_capacity(self.registrations.len());
        for registration in self.registrations {
            let (tx, rx) = mpsc::channel(queue_capacity);
            dispatch::spawn_worker(
                registration.name.clone(),
                registration.handler,
                rx,
                max_concurrency,
                stats.clone(),
            );
            queues.push(SubscriberQueue {
                name: registration.name,
                tx,
            });
        }

        tracing::info!(
            subscribers = queues.len(),
            queue_capacity,
            max_concurrency,
            "event bus started"
        );

        EventBus {
            names: queues.iter().map(|q| q.name.clone()).collect(),
            queues: RwLock::new(Some(queues.into())),
            in_flight: InFlightTracker::new(),
            stats,
        }
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

struct SubscriberQueue {
    name: String,
    tx: mpsc::Sender<Delivery>,
}

/// Fan-out bus with a frozen subscriber set.
pub struct EventBus {
    names: Arc<[String]>,
    /// `None` once closed. Dropping the senders lets workers drain and exit.
    queues: RwLock<Option<Arc<[SubscriberQueue]>>>,
    in_flight: InFlightTracker,
    stats: Arc<BusStats>,
}

impl EventBus {
    pub fn builder(config: BusConfig) -> EventBusBuilder {
        EventBusBuilder::new(config)
    }

    /// Offer `event` to every subscriber without waiting for any of them.
    pub fn publish(&self, event: DeviceEvent) {
        let Some(queues) = self.queues.read().clone() else {
            self.stats.record_rejected();
            tracing::debug!(device = %event.source_id(), "publish after close ignored");
            return;
        };

        self.stats.record_published();
        telemetry::record_event_published();

        let event = Arc::new(event);
        for queue in queues.iter() {
            let delivery = Delivery {
                event: event.clone(),
                guard: self.in_flight.track(),
            };
            self.offer(queue, delivery);
        }
    }

    fn offer(&self, queue: &SubscriberQueue, delivery: Delivery) {
        match queue.tx.try_send(delivery) {
            Ok(()) => self.stats.record_enqueued(),
            Err(TrySendError::Full(dropped)) => {
                self.stats.record_dropped();
                telemetry::record_delivery_dropped(&queue.name);
                tracing::warn!(
                    subscriber = %queue.name,
                    device = %dropped.event.source_id(),
                    "subscriber queue full, event dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.record_dropped();
                telemetry::record_delivery_dropped(&queue.name);
                tracing::warn!(subscriber = %queue.name, "subscriber worker gone, event dropped");
            }
        }
    }

    /// Stop accepting events. Queued deliveries still run.
    pub fn close(&self) {
        if self.queues.write().take().is_some() {
            tracing::info!("event bus closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.queues.read().is_none()
    }

    /// Close, then wait for queued and running deliveries to finish.
    pub async fn drain(&self, timeout: Duration) -> ShutdownResult {
        self.close();
        let result = self.in_flight.wait_idle(timeout).await;
        match &result {
            ShutdownResult::Complete => tracing::info!("event bus drained"),
            ShutdownResult::Timeout { remaining } => {
                tracing::warn!(remaining, "event bus drain timed out")
            }
        }
        result
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.count()
    }

    pub fn subscriber_names(&self) -> &[String] {
        &self.names
    }

    pub fn stats(&self) -> BusStatsSnapshot {
        self.stats.snapshot(self.in_flight.count())
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.close();
    }
}
