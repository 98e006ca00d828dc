//! Pipeline assembly and ordered shutdown.
//!
//! [`Pipeline::start`] wires the persistence consumer onto a fresh bus and
//! only then spawns the collector, so every subscriber is registered before
//! the first event exists. [`RunningPipeline::stop`] tears down in reverse:
//! producer first, then the bus drain, then the store client.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::bus::{BusConfig, EventBus, EventHandler};
use crate::collector::{Collector, CollectorConfig, CollectorState, Sampler, SimulatedSensor};
use crate::config::AppConfig;
use crate::health::{HealthChecker, HealthReport};
use crate::repo::{PersistenceConsumer, SUBSCRIBER_NAME};
use crate::shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
use crate::store::PointWriter;
use crate::telemetry;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub bus: BusConfig,
    pub collector: CollectorConfig,
    pub sensor_jitter: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            collector: CollectorConfig::default(),
            sensor_jitter: 0.0,
        }
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            bus: config.bus,
            collector: config.collector.clone(),
            sensor_jitter: config.sensor_jitter,
        }
    }
}

/// Outcome of [`RunningPipeline::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// The collector task ended within the timeout.
    pub collector_exited: bool,
    pub drain: ShutdownResult,
    /// `close()` on the store returned Ok.
    pub store_closed: bool,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.collector_exited && self.drain.is_complete() && self.store_closed
    }
}

/// A pipeline that has not been started yet.
pub struct Pipeline {
    config: PipelineConfig,
    writer: Arc<dyn PointWriter>,
    sampler: Option<Box<dyn Sampler>>,
    extra: Vec<(String, Arc<dyn EventHandler>)>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, writer: Arc<dyn PointWriter>) -> Self {
        Self {
            config,
            writer,
            sampler: None,
            extra: Vec::new(),
        }
    }

    /// Replace the simulated sensor.
    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Register another subscriber next to the persistence consumer.
    pub fn extra_subscriber(mut self, name: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.extra.push((name.into(), handler));
        self
    }

    /// Build the bus, then spawn the collector.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> RunningPipeline {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let consumer = Arc::new(PersistenceConsumer::new(self.writer.clone()));

        let mut builder = EventBus::builder(self.config.bus).subscribe(SUBSCRIBER_NAME, consumer.clone());
        for (name, handler) in self.extra {
            builder = builder.subscribe(name, handler);
        }
        let bus = Arc::new(builder.build());

        let sampler: Box<dyn Sampler> = match self.sampler {
            Some(sampler) => sampler,
            None => Box::new(SimulatedSensor::with_jitter(self.config.sensor_jitter)),
        };
        let collector = Arc::new(Collector::with_sampler(self.config.collector, bus.clone(), sampler));
        let collector_task = collector.clone().spawn(shutdown.child_token());

        tracing::info!(subscribers = bus.subscriber_names().len(), "pipeline started");

        RunningPipeline {
            handle: PipelineHandle {
                shutdown,
                bus,
                collector,
                consumer,
            },
            collector_task,
            writer: self.writer,
        }
    }
}

/// Shared read access to a running pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    shutdown: Arc<ShutdownCoordinator>,
    bus: Arc<EventBus>,
    collector: Arc<Collector>,
    consumer: Arc<PersistenceConsumer>,
}

impl PipelineHandle {
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    pub fn consumer(&self) -> &Arc<PersistenceConsumer> {
        &self.consumer
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown.state()
    }

    pub fn collector_state(&self) -> CollectorState {
        self.collector.state()
    }

    pub fn health_report(&self, checker: &HealthChecker) -> HealthReport {
        checker.report(
            self.shutdown_state(),
            self.collector_state(),
            &self.bus.stats(),
            &self.consumer.stats(),
        )
    }
}

/// A started pipeline. Call [`stop`](Self::stop) to shut it down.
pub struct RunningPipeline {
    handle: PipelineHandle,
    collector_task: JoinHandle<()>,
    writer: Arc<dyn PointWriter>,
}

impl RunningPipeline {
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.handle.bus()
    }

    pub fn collector(&self) -> &Arc<Collector> {
        self.handle.collector()
    }

    pub fn consumer(&self) -> &Arc<PersistenceConsumer> {
        self.handle.consumer()
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.handle.shutdown_state()
    }

    /// Stop the collector, drain the bus, close the store. In that order.
    ///
    /// Each of the first two phases is bounded by `timeout`. The store is
    /// closed after the drain returns, whether or not it completed.
    pub async fn stop(self, timeout: Duration) -> StopReport {
        let RunningPipeline {
            handle,
            mut collector_task,
            writer,
        } = self;

        tracing::info!(timeout_ms = telemetry::duration_ms(timeout), "pipeline stopping");
        handle.shutdown.begin();

        let collector_exited = match tokio::time::timeout(timeout, &mut collector_task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "collector task failed");
                false
            }
            Err(_) => {
                tracing::warn!("collector did not stop in time, aborting");
                collector_task.abort();
                false
            }
        };

        let drain = handle.bus.drain(timeout).await;

        let store_closed = match writer.close().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "store close failed");
                false
            }
        };

        handle.shutdown.finish();

        let report = StopReport {
            collector_exited,
            drain,
            store_closed,
        };
        tracing::info!(clean = report.is_clean(), "pipeline stopped");
        report
    }
}
