//! Event bus fan-out, isolation, overflow and drain tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};

use device_ingest::bus::{handler_fn, BusConfig, EventBus, EventHandler, HandlerError};
use device_ingest::event::DeviceEvent;
use device_ingest::shutdown::ShutdownResult;

fn event(n: u32) -> DeviceEvent {
    DeviceEvent::from_pairs("A1", [("seq", f64::from(n))])
}

fn counting(counter: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
    handler_fn(move |_event| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

/// Handler that signals `started` and then waits for a permit on `gate`.
fn gated(started: Arc<Notify>, gate: Arc<Semaphore>) -> Arc<dyn EventHandler> {
    handler_fn(move |_event| {
        let started = started.clone();
        let gate = gate.clone();
        async move {
            started.notify_one();
            let _permit = gate.acquire().await.map_err(|e| HandlerError::new(e.to_string()))?;
            Ok(())
        }
    })
}

#[tokio::test]
async fn test_every_subscriber_receives_every_event() {
    let counters: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let mut builder = EventBus::builder(BusConfig::default());
    for (i, counter) in counters.iter().enumerate() {
        builder = builder.subscribe(format!("sub-{i}"), counting(counter.clone()));
    }
    let bus = builder.build();

    for n in 0..5 {
        bus.publish(event(n));
    }
    assert_eq!(bus.drain(Duration::from_secs(5)).await, ShutdownResult::Complete);

    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
    let stats = bus.stats();
    assert_eq!(stats.published, 5);
    assert_eq!(stats.enqueued, 15);
    assert_eq!(stats.delivered, 15);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_publish_without_subscribers_is_noop() {
    let bus = EventBus::builder(BusConfig::default()).build();
    bus.publish(event(1));

    assert!(bus.subscriber_names().is_empty());
    assert_eq!(bus.stats().published, 1);
    assert_eq!(bus.drain(Duration::from_millis(100)).await, ShutdownResult::Complete);
}

#[tokio::test]
async fn test_failing_and_panicking_subscribers_are_isolated() {
    let healthy = Arc::new(AtomicUsize::new(0));
    let bus = EventBus::builder(BusConfig::default())
        .subscribe(
            "failing",
            handler_fn(|_event| async { Err(HandlerError::new("sink rejected event")) }),
        )
        .subscribe(
            "panicking",
            handler_fn(|event| async move {
                if event.reading("seq") == Some(1.0) {
                    panic!("bad reading");
                }
                Ok(())
            }),
        )
        .subscribe("healthy", counting(healthy.clone()))
        .build();

    for n in 0..3 {
        bus.publish(event(n));
    }
    assert_eq!(bus.drain(Duration::from_secs(5)).await, ShutdownResult::Complete);

    assert_eq!(healthy.load(Ordering::SeqCst), 3);
    let stats = bus.stats();
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.panicked, 1);
    // 3 healthy + 2 from the panicking subscriber.
    assert_eq!(stats.delivered, 5);
}

/// Panics in `handle` itself, before any future exists, for the first event.
struct EagerPanic {
    handled: Arc<AtomicUsize>,
}

impl EventHandler for EagerPanic {
    fn handle<'life0, 'async_trait>(
        &'life0 self,
        event: Arc<DeviceEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        Self: 'async_trait,
    {
        if event.reading("seq") == Some(0.0) {
            panic!("rejected before polling");
        }
        let handled = self.handled.clone();
        Box::pin(async move {
            handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[tokio::test]
async fn test_panic_before_future_is_created_is_contained() {
    let handled = Arc::new(AtomicUsize::new(0));
    let healthy = Arc::new(AtomicUsize::new(0));
    let bus = EventBus::builder(BusConfig::default())
        .subscribe(
            "eager",
            Arc::new(EagerPanic {
                handled: handled.clone(),
            }),
        )
        .subscribe("healthy", counting(healthy.clone()))
        .build();

    for n in 0..4 {
        bus.publish(event(n));
    }
    assert_eq!(bus.drain(Duration::from_secs(5)).await, ShutdownResult::Complete);

    // The worker survives the first panic and handles the rest.
    assert_eq!(handled.load(Ordering::SeqCst), 3);
    assert_eq!(healthy.load(Ordering::SeqCst), 4);
    let stats = bus.stats();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.delivered, 7);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn test_publish_to_stopped_worker_counts_drop() {
    let counter = Arc::new(AtomicUsize::new(0));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let bus = runtime.block_on(async {
        EventBus::builder(BusConfig::default())
            .subscribe("counter", counting(counter.clone()))
            .build()
    });
    // Dropping the runtime drops the worker task and its receiver.
    drop(runtime);

    bus.publish(event(1));

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    let stats = bus.stats();
    assert_eq!(stats.published, 1);
    assert_eq!(stats.enqueued, 0);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_full_queue_drops_newest_for_that_subscriber() {
    let started = Arc::new(Notify::new());
    let gate = Arc::new(Semaphore::new(0));
    let bus = EventBus::builder(BusConfig {
        queue_capacity: 1,
        max_concurrency: 1,
    })
    .subscribe("slow", gated(started.clone(), gate.clone()))
    .build();

    bus.publish(event(1));
    started.notified().await;

    // Handler busy with #1: #2 fills the queue, #3 and #4 are dropped.
    bus.publish(event(2));
    bus.publish(event(3));
    bus.publish(event(4));
    assert_eq!(bus.stats().dropped, 2);
    assert_eq!(bus.in_flight(), 2);

    gate.add_permits(10);
    assert_eq!(bus.drain(Duration::from_secs(5)).await, ShutdownResult::Complete);
    assert_eq!(bus.stats().delivered, 2);
}

#[tokio::test]
async fn test_max_concurrency_bounds_parallel_calls() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let handler = {
        let running = running.clone();
        let peak = peak.clone();
        handler_fn(move |_event| {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let bus = EventBus::builder(BusConfig {
        queue_capacity: 16,
        max_concurrency: 2,
    })
    .subscribe("bounded", handler)
    .build();

    for n in 0..8 {
        bus.publish(event(n));
    }
    assert_eq!(bus.drain(Duration::from_secs(5)).await, ShutdownResult::Complete);

    assert_eq!(bus.stats().delivered, 8);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_publish_after_close_is_rejected() {
    let counter = Arc::new(AtomicUsize::new(0));
    let bus = EventBus::builder(BusConfig::default())
        .subscribe("counter", counting(counter.clone()))
        .build();

    bus.close();
    assert!(bus.is_closed());
    bus.publish(event(1));

    assert_eq!(bus.drain(Duration::from_millis(100)).await, ShutdownResult::Complete);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(bus.stats().rejected, 1);
    assert_eq!(bus.stats().published, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drain_times_out_on_stuck_handler() {
    let started = Arc::new(Notify::new());
    let gate = Arc::new(Semaphore::new(0));
    let bus = EventBus::builder(BusConfig::default())
        .subscribe("stuck", gated(started.clone(), gate.clone()))
        .build();

    bus.publish(event(1));
    started.notified().await;

    let result = bus.drain(Duration::from_millis(50)).await;
    assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });

    gate.add_permits(1);
    assert_eq!(bus.drain(Duration::from_secs(1)).await, ShutdownResult::Complete);
}
