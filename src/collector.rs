//! Periodic collector: samples a sensor on a fixed interval and publishes
//! each reading to the bus.
//!
//! State machine: `Idle -> Running -> Stopping -> Stopped`. Only the
//! cancellation token moves it out of `Running`; downstream failures are
//! invisible here.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::event::{DeviceEvent, Readings};
use crate::telemetry;

/// Shortest tick period the collector will run with.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Collector lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CollectorState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl CollectorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Source id stamped on every event.
    pub device_id: String,
    pub interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            device_id: "A1".to_string(),
            interval: Duration::from_secs(3),
        }
    }
}

/// Produces one set of readings per tick.
pub trait Sampler: Send + Sync {
    fn sample(&self) -> Readings;
}

/// Stand-in for a real sensor feed.
///
/// Returns the base readings, optionally with uniform noise of at most
/// `jitter` added to each value.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    base: Readings,
    jitter: f64,
}

impl SimulatedSensor {
    pub fn new(base: Readings, jitter: f64) -> Self {
        let jitter = if jitter.is_finite() { jitter.abs() } else { 0.0 };
        Self { base, jitter }
    }

    /// The default temperature feed with the given noise amplitude.
    pub fn with_jitter(jitter: f64) -> Self {
        Self::new(Readings::from([("temp".to_string(), 23.5)]), jitter)
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::with_jitter(0.0)
    }
}

impl Sampler for SimulatedSensor {
    fn sample(&self) -> Readings {
        if self.jitter == 0.0 {
            return self.base.clone();
        }
        let mut rng = rand::thread_rng();
        self.base
            .iter()
            .map(|(name, value)| (name.clone(), value + rng.gen_range(-self.jitter..=self.jitter)))
            .collect()
    }
}

pub struct Collector {
    config: CollectorConfig,
    bus: Arc<EventBus>,
    sampler: Box<dyn Sampler>,
    state: AtomicU8,
    ticks: AtomicU64,
}

impl Collector {
    pub fn new(config: CollectorConfig, bus: Arc<EventBus>) -> Self {
        Self::with_sampler(config, bus, Box::new(SimulatedSensor::default()))
    }

    /// An interval below [`MIN_INTERVAL`] is raised to it.
    pub fn with_sampler(mut config: CollectorConfig, bus: Arc<EventBus>, sampler: Box<dyn Sampler>) -> Self {
        if config.interval < MIN_INTERVAL {
            tracing::warn!(
                device = %config.device_id,
                interval = ?config.interval,
                "collector interval below minimum, using 1ms"
            );
            config.interval = MIN_INTERVAL;
        }
        Self {
            config,
            bus,
            sampler,
            state: AtomicU8::new(CollectorState::Idle as u8),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn state(&self) -> CollectorState {
        CollectorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Events published so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Run the loop on its own task.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Tick until `cancel` fires. The first event is published one full
    /// interval after the call.
    pub async fn run(&self, cancel: CancellationToken) {
        if self
            .state
            .compare_exchange(
                CollectorState::Idle as u8,
                CollectorState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::warn!(state = ?self.state(), "collector already started");
            return;
        }

        let period = self.config.interval;
        tracing::info!(
            device = %self.config.device_id,
            interval_ms = telemetry::duration_ms(period),
            "collector started"
        );

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.set_state(CollectorState::Stopping);
                    break;
                }
                _ = ticker.tick() => self.collect(),
            }
        }

        drop(ticker);
        self.set_state(CollectorState::Stopped);
        tracing::info!(device = %self.config.device_id, ticks = self.ticks(), "collector exit");
    }

    fn collect(&self) {
        tracing::info!(device = %self.config.device_id, "collecting data");
        let readings = self.sampler.sample();
        self.bus.publish(DeviceEvent::new(self.config.device_id.clone(), readings));
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn set_state(&self, state: CollectorState) {
        self.state.store(state as u8, Ordering::Release);
    }
}
