//! Counters and histograms recorded through the `metrics` facade.

use std::time::Duration;

/// Outcome of one handler invocation on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Ok,
    Failed,
    Panicked,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Panicked => "panicked",
        }
    }
}

pub fn record_event_published() {
    metrics::counter!("ingest_events_published_total").increment(1);
}

pub fn record_delivery(subscriber: &str, outcome: DeliveryOutcome) {
    metrics::counter!(
        "ingest_deliveries_total",
        "subscriber" => subscriber.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_delivery_dropped(subscriber: &str) {
    metrics::counter!(
        "ingest_deliveries_dropped_total",
        "subscriber" => subscriber.to_string()
    )
    .increment(1);
}

pub fn record_store_write(ok: bool, latency: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("ingest_store_writes_total", "outcome" => outcome).increment(1);
    metrics::histogram!("ingest_store_write_seconds").record(latency.as_secs_f64());
}
