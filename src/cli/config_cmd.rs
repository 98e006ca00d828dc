//! Config CLI subcommands: show, validate.
//!
//! These commands read configuration directly from environment variables
//! without starting the pipeline.

use crate::config::{self, AppConfig, ConfigError, EffectiveConfig};

use super::EXIT_CONFIG;

/// Print the effective config as key-value pairs to stdout.
///
/// Returns 0 on success, 2 if the configuration does not load.
pub fn run_show() -> i32 {
    match config::load() {
        Ok(cfg) => {
            print!("{}", render(&cfg.effective()));
            0
        }
        Err(e) => report_error(&e),
    }
}

/// Returns 0 if the configuration loads, 2 otherwise.
pub fn run_validate() -> i32 {
    validate_with(config::load())
}

fn validate_with(result: Result<AppConfig, ConfigError>) -> i32 {
    match result {
        Ok(_) => {
            println!("Configuration is valid.");
            0
        }
        Err(e) => report_error(&e),
    }
}

fn report_error(e: &ConfigError) -> i32 {
    eprintln!("ERROR: {}", e);
    EXIT_CONFIG
}

fn render(cfg: &EffectiveConfig) -> String {
    let password = if cfg.influx_password_set { "<redacted>" } else { "" };
    let lines = [
        format!("APP_INFLUX_URL={}", cfg.influx_url),
        format!("APP_INFLUX_USERNAME={}", cfg.influx_username),
        format!("APP_INFLUX_PASSWORD={}", password),
        format!("APP_INFLUX_DATABASE={}", cfg.influx_database),
        format!("APP_INFLUX_PRECISION={}", cfg.influx_precision),
        format!("APP_INFLUX_TIMEOUT={}ms", cfg.influx_timeout_ms),
        format!("APP_PORT={}", cfg.http_port),
        format!("APP_DEVICE_ID={}", cfg.device_id),
        format!("APP_COLLECT_INTERVAL={}ms", cfg.collect_interval_ms),
        format!("APP_SENSOR_JITTER={}", cfg.sensor_jitter),
        format!("APP_BUS_QUEUE_CAPACITY={}", cfg.bus_queue_capacity),
        format!("APP_BUS_MAX_CONCURRENCY={}", cfg.bus_max_concurrency),
        format!("APP_SHUTDOWN_TIMEOUT={}ms", cfg.shutdown_timeout_ms),
        format!("APP_LOG_FORMAT={}", cfg.log_format),
        format!("APP_LOG_LEVEL={}", cfg.log_level),
    ];
    lines.iter().map(|line| format!("{}\n", line)).collect()
}
