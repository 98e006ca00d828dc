//! Time-series store: point model, line protocol, and writer clients.

mod influx;
pub mod line_protocol;
mod memory;
mod point;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use influx::{InfluxClient, InfluxConfig};
pub use line_protocol::Precision;
pub use memory::MemoryStore;
pub use point::{Point, PointError, DEVICE_MEASUREMENT, DEVICE_TAG};

/// Errors returned by a [`PointWriter`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store client is closed")]
    Closed,

    #[error("Store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store transport error: {0}")]
    Transport(String),

    #[error("Store rejected write with status {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Invalid point: {0}")]
    InvalidPoint(#[from] PointError),

    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
}

impl StoreError {
    /// Errors that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Destination for points.
///
/// Implementations must accept concurrent `write` calls: the consumer may
/// have several deliveries in flight when writes are slower than the
/// collection interval.
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// Write a single point.
    async fn write(&self, point: &Point) -> Result<(), StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release the connection. Later writes fail with [`StoreError::Closed`].
    /// Calling it again is a no-op.
    async fn close(&self) -> Result<(), StoreError>;
}
