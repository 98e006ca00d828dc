//! device-ingest
//!
//! Periodic device telemetry collection, in-process fan-out, and InfluxDB
//! persistence.
//!
//! # Data Flow
//!
//! ```text
//! Collector --publish--> EventBus --queue per subscriber--> PersistenceConsumer --> PointWriter
//! ```
//!
//! - **Collector**: samples a sensor every interval and publishes a [`DeviceEvent`]
//! - **EventBus**: non-blocking fan-out with bounded per-subscriber queues
//! - **PersistenceConsumer**: maps each event to a [`Point`] and writes it
//! - **Pipeline**: wires the above and stops them in order
//!
//! Delivery is at-most-once and best effort. Failures are logged and counted
//! where they happen and never travel back to the producer.

pub mod bus;
pub mod cli;
pub mod collector;
pub mod config;
pub mod event;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod repo;
pub mod shutdown;
pub mod store;
pub mod telemetry;

pub use bus::{handler_fn, BusConfig, EventBus, EventBusBuilder, EventHandler, HandlerError};
pub use collector::{Collector, CollectorConfig, CollectorState, Sampler, SimulatedSensor};
pub use config::{AppConfig, ConfigError};
pub use event::{DeviceEvent, Readings};
pub use lifecycle::{Pipeline, PipelineConfig, PipelineHandle, RunningPipeline, StopReport};
pub use repo::PersistenceConsumer;
pub use store::{InfluxClient, MemoryStore, Point, PointWriter, StoreError};
