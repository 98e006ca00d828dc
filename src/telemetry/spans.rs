//! Span utilities for store writes.

use tracing::{info_span, Span};

/// Extension trait for adding an operation outcome to a span.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for store write spans.
pub struct WriteSpan;

impl WriteSpan {
    /// Fields:
    /// - `device`: source id of the event being persisted
    /// - `measurement`: target series
    /// - `status`, `error.message`: filled in by `SpanExt::record_result`
    /// - `latency_ms`: filled in after the write returns
    pub fn new(device: &str, measurement: &str) -> Span {
        info_span!(
            "store_write",
            device = %device,
            measurement = %measurement,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
