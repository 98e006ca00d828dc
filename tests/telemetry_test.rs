//! Telemetry module tests.

use std::time::Duration;

use device_ingest::telemetry::{
    duration_ms, record_delivery, record_delivery_dropped, record_event_published, record_store_write,
    DeliveryOutcome, LogConfig, LogError, LogFormat, SpanExt, WriteSpan,
};
use tracing::Span;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
}

#[test]
fn log_format_accepts_text_alias() {
    assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert_eq!(LogFormat::Pretty.as_str(), "pretty");
}

// =============================================================================
// LogError Tests
// =============================================================================

#[test]
fn log_error_invalid_filter_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("Invalid log filter"));
    assert!(error.to_string().contains("bad filter"));
}

#[test]
fn log_error_invalid_format_display() {
    let error = "yaml".parse::<LogFormat>().unwrap_err();
    assert!(error.to_string().contains("yaml"));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn record_result_on_disabled_span_is_noop() {
    let span = Span::none();
    span.record_result::<(), String>(&Ok(()));
    span.record_result::<(), String>(&Err("connection refused".to_string()));
}

#[test]
fn write_span_is_named_store_write() {
    let span = WriteSpan::new("A1", "device_data");
    if let Some(meta) = span.metadata() {
        assert_eq!(meta.name(), "store_write");
    }
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn metrics_without_recorder_do_not_panic() {
    record_event_published();
    record_delivery("persistence", DeliveryOutcome::Ok);
    record_delivery("persistence", DeliveryOutcome::Panicked);
    record_delivery_dropped("persistence");
    record_store_write(true, Duration::from_millis(3));
    record_store_write(false, Duration::from_secs(5));
}

#[test]
fn delivery_outcome_labels() {
    assert_eq!(DeliveryOutcome::Ok.as_str(), "ok");
    assert_eq!(DeliveryOutcome::Failed.as_str(), "failed");
    assert_eq!(DeliveryOutcome::Panicked.as_str(), "panicked");
}

#[test]
fn duration_ms_saturates() {
    assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
    assert_eq!(duration_ms(Duration::MAX), u64::MAX);
}
