//! Configuration loading from environment variables.
//!
//! Everything is read once, validated, and frozen into [`AppConfig`] before
//! any component is built. Unlike tuning knobs, connection settings are not
//! guessed: a missing database or an unparsable value is an error and the
//! process must not start.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `APP_INFLUX_URL` | `http://localhost:8086` | InfluxDB base URL |
//! | `APP_INFLUX_USERNAME` | `admin` | Basic auth user (blank falls back to `admin`) |
//! | `APP_INFLUX_PASSWORD` | empty | Basic auth password |
//! | `APP_INFLUX_DATABASE` | required | Target database |
//! | `APP_INFLUX_PRECISION` | `s` | `ns`, `u`, `ms`, `s`, `m` or `h` |
//! | `APP_INFLUX_TIMEOUT` | `5s` | Per-request timeout |
//! | `APP_PORT` | 8080 | HTTP control surface port |
//! | `APP_DEVICE_ID` | `A1` | Source id of collected events |
//! | `APP_COLLECT_INTERVAL` | `3s` | Collection cadence |
//! | `APP_SENSOR_JITTER` | 0 | Noise amplitude of the simulated sensor |
//! | `APP_BUS_QUEUE_CAPACITY` | 64 | Per-subscriber queue bound |
//! | `APP_BUS_MAX_CONCURRENCY` | 4 | Concurrent handler calls per subscriber |
//! | `APP_SHUTDOWN_TIMEOUT` | `10s` | Grace period per shutdown phase |
//! | `APP_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `APP_LOG_LEVEL` | `RUST_LOG`, then `info` | Tracing filter |

use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use thiserror::Error;

use crate::bus::BusConfig;
use crate::collector::CollectorConfig;
use crate::store::line_protocol::ParsePrecisionError;
use crate::store::{InfluxConfig, Precision};
use crate::telemetry::{self, LogConfig, LogFormat};

const DEFAULT_INFLUX_URL: &str = "http://localhost:8086";
const DEFAULT_INFLUX_USERNAME: &str = "admin";
const DEFAULT_INFLUX_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DEVICE_ID: &str = "A1";
const DEFAULT_COLLECT_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_INFLUX_DATABASE is required")]
    MissingDatabase,

    #[error("Invalid APP_INFLUX_URL {value:?}: {reason}")]
    InvalidUrl { value: String, reason: String },

    #[error("Invalid APP_INFLUX_PRECISION: {0}")]
    InvalidPrecision(#[from] ParsePrecisionError),

    #[error("Invalid duration in {key}={value:?}: {reason}")]
    InvalidDuration {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid number in {key}={value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    NotPositive { key: &'static str },

    #[error("Invalid APP_LOG_FORMAT {0:?} (expected json or pretty)")]
    InvalidLogFormat(String),
}

/// All process configuration, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub influx: InfluxConfig,
    pub http_port: u16,
    pub collector: CollectorConfig,
    pub sensor_jitter: f64,
    pub bus: BusConfig,
    pub shutdown_timeout: Duration,
    pub log: LogConfig,
}

/// Printable configuration summary with secrets redacted.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub influx_url: String,
    pub influx_username: String,
    pub influx_password_set: bool,
    pub influx_database: String,
    pub influx_precision: String,
    pub influx_timeout_ms: u64,
    pub http_port: u16,
    pub device_id: String,
    pub collect_interval_ms: u64,
    pub sensor_jitter: f64,
    pub bus_queue_capacity: usize,
    pub bus_max_concurrency: usize,
    pub shutdown_timeout_ms: u64,
    pub log_format: String,
    pub log_level: String,
}

/// Load configuration from the process environment.
pub fn load() -> Result<AppConfig, ConfigError> {
    load_from(|key| std::env::var(key).ok())
}

/// Load configuration through `lookup`. Empty values count as unset.
pub fn load_from<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let database = get("APP_INFLUX_DATABASE").ok_or(ConfigError::MissingDatabase)?;

    let url_value = get("APP_INFLUX_URL").unwrap_or_else(|| DEFAULT_INFLUX_URL.to_string());
    let url = Url::parse(&url_value).map_err(|e| ConfigError::InvalidUrl {
        value: url_value.clone(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            value: url_value,
            reason: "not a base URL".to_string(),
        });
    }

    let precision = match get("APP_INFLUX_PRECISION") {
        Some(value) => value.parse::<Precision>()?,
        None => Precision::Seconds,
    };

    let influx = InfluxConfig {
        url,
        username: get("APP_INFLUX_USERNAME").unwrap_or_else(|| DEFAULT_INFLUX_USERNAME.to_string()),
        password: lookup("APP_INFLUX_PASSWORD").unwrap_or_default(),
        database,
        precision,
        timeout: parse_duration(&get, "APP_INFLUX_TIMEOUT", DEFAULT_INFLUX_TIMEOUT)?,
    };

    let http_port = parse_number(&get, "APP_PORT", DEFAULT_PORT)?;

    let interval = parse_duration(&get, "APP_COLLECT_INTERVAL", DEFAULT_COLLECT_INTERVAL)?;
    let collector = CollectorConfig {
        device_id: get("APP_DEVICE_ID").unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
        interval,
    };

    let sensor_jitter: f64 = parse_number(&get, "APP_SENSOR_JITTER", 0.0)?;
    if !sensor_jitter.is_finite() {
        return Err(ConfigError::InvalidNumber {
            key: "APP_SENSOR_JITTER",
            value: sensor_jitter.to_string(),
        });
    }

    let bus = BusConfig {
        queue_capacity: parse_number(&get, "APP_BUS_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?.max(1),
        max_concurrency: parse_number(&get, "APP_BUS_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?.max(1),
    };

    let shutdown_timeout = parse_duration(&get, "APP_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT)?;

    let log = LogConfig {
        format: match get("APP_LOG_FORMAT") {
            Some(value) => value
                .parse::<LogFormat>()
                .map_err(|_| ConfigError::InvalidLogFormat(value))?,
            None => LogFormat::Json,
        },
        level: get("APP_LOG_LEVEL")
            .or_else(|| get("RUST_LOG"))
            .unwrap_or_else(|| "info".to_string()),
    };

    Ok(AppConfig {
        influx,
        http_port,
        collector,
        sensor_jitter,
        bus,
        shutdown_timeout,
        log,
    })
}

fn parse_duration<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let duration = match get(key) {
        Some(value) => humantime::parse_duration(&value).map_err(|e| ConfigError::InvalidDuration {
            key,
            value: value.clone(),
            reason: e.to_string(),
        })?,
        None => default,
    };
    if duration.is_zero() {
        return Err(ConfigError::NotPositive { key });
    }
    Ok(duration)
}

fn parse_number<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn effective(&self) -> EffectiveConfig {
        EffectiveConfig {
            influx_url: self.influx.url.to_string(),
            influx_username: self.influx.username.clone(),
            influx_password_set: !self.influx.password.is_empty(),
            influx_database: self.influx.database.clone(),
            influx_precision: self.influx.precision.as_str().to_string(),
            influx_timeout_ms: telemetry::duration_ms(self.influx.timeout),
            http_port: self.http_port,
            device_id: self.collector.device_id.clone(),
            collect_interval_ms: telemetry::duration_ms(self.collector.interval),
            sensor_jitter: self.sensor_jitter,
            bus_queue_capacity: self.bus.queue_capacity,
            bus_max_concurrency: self.bus.max_concurrency,
            shutdown_timeout_ms: telemetry::duration_ms(self.shutdown_timeout),
            log_format: self.log.format.as_str().to_string(),
            log_level: self.log.level.clone(),
        }
    }
}
