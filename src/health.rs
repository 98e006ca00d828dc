//! Health check support for the ingest pipeline.
//!
//! Provides liveness, readiness, and a full health report for the HTTP
//! status endpoint and orchestrator probes.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::bus::BusStatsSnapshot;
use crate::collector::CollectorState;
use crate::repo::ConsumerStats;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub shutdown: ShutdownState,
    pub collector: CollectorState,
    pub uptime_secs: u64,
    pub events_published: u64,
    pub points_written: u64,
    pub write_errors: u64,
    pub deliveries_dropped: u64,
}

/// Aggregates health information from pipeline components.
pub struct HealthChecker {
    start_time: Instant,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: producing and accepting events.
    pub fn is_ready(&self, shutdown_state: ShutdownState, collector_state: CollectorState) -> bool {
        shutdown_state == ShutdownState::Running && collector_state == CollectorState::Running
    }

    /// Generate full health report.
    pub fn report(
        &self,
        shutdown_state: ShutdownState,
        collector_state: CollectorState,
        bus: &BusStatsSnapshot,
        consumer: &ConsumerStats,
    ) -> HealthReport {
        HealthReport {
            state: self.compute_state(shutdown_state, consumer),
            ready: self.is_ready(shutdown_state, collector_state),
            shutdown: shutdown_state,
            collector: collector_state,
            uptime_secs: self.start_time.elapsed().as_secs(),
            events_published: bus.published,
            points_written: consumer.written,
            write_errors: consumer.write_errors,
            deliveries_dropped: bus.dropped,
        }
    }

    fn compute_state(&self, shutdown_state: ShutdownState, consumer: &ConsumerStats) -> HealthState {
        if shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if consumer.write_errors > 0 && consumer.written == 0 {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
