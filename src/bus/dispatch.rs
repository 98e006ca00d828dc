//! Per-subscriber dispatch worker.
//!
//! A worker owns the receiving end of one subscriber queue. It runs up to
//! `max_concurrency` handler calls at once and exits once the queue is
//! closed and empty.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::stats::BusStats;
use super::EventHandler;
use crate::event::DeviceEvent;
use crate::shutdown::InFlightGuard;
use crate::telemetry::{self, DeliveryOutcome};

/// One queued event for one subscriber.
pub(super) struct Delivery {
    pub(super) event: Arc<DeviceEvent>,
    pub(super) guard: InFlightGuard,
}

pub(super) fn spawn_worker(
    name: String,
    handler: Arc<dyn EventHandler>,
    rx: mpsc::Receiver<Delivery>,
    max_concurrency: usize,
    stats: Arc<BusStats>,
) {
    tokio::spawn(async move {
        let subscriber = name.as_str();
        let handler = handler.as_ref();
        let stats = stats.as_ref();

        ReceiverStream::new(rx)
            .for_each_concurrent(max_concurrency, move |delivery| async move {
                deliver(subscriber, handler, delivery, stats).await;
            })
            .await;

        tracing::debug!(subscriber = %name, "dispatch worker stopped");
    });
}

async fn deliver(subscriber: &str, handler: &dyn EventHandler, delivery: Delivery, stats: &BusStats) {
    let Delivery { event, guard } = delivery;
    let device = event.source_id().to_string();

    // `handle` itself runs inside the boundary too: an impl may panic
    // before it returns its future.
    let outcome = AssertUnwindSafe(async move { handler.handle(event).await })
        .catch_unwind()
        .await;
    let outcome = match outcome {
        Ok(Ok(())) => {
            stats.record_delivered();
            DeliveryOutcome::Ok
        }
        Ok(Err(e)) => {
            stats.record_failed();
            tracing::warn!(subscriber, device = %device, error = %e, "handler failed");
            DeliveryOutcome::Failed
        }
        Err(panic) => {
            stats.record_panicked();
            tracing::error!(
                subscriber,
                device = %device,
                panic = %panic_message(panic.as_ref()),
                "handler panicked"
            );
            DeliveryOutcome::Panicked
        }
    };
    telemetry::record_delivery(subscriber, outcome);

    drop(guard);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
