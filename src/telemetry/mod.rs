//! Telemetry for the ingest pipeline.
//!
//! Structured logging through `tracing`, write spans, and counters through
//! the `metrics` facade. No exporter is installed here; a host process may
//! install one before starting the pipeline.

use std::time::Duration;

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_delivery, record_delivery_dropped, record_event_published, record_store_write,
    DeliveryOutcome,
};
pub use spans::{SpanExt, WriteSpan};

/// Whole milliseconds in `duration` for log fields, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
