//! device-ingest entry point.
//!
//! Bootstraps the ingest pipeline with:
//! - Configuration loading (fail-fast)
//! - Store reachability check (fail-fast)
//! - Collector, bus and persistence consumer
//! - HTTP control surface
//! - Signal handling for graceful shutdown
//!
//! ## CLI Subcommands
//!
//! - `device-ingest` or `device-ingest serve` - Run the pipeline (default)
//! - `device-ingest config show` - Print effective configuration
//! - `device-ingest config validate` - Validate configuration (exit 0/2)

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use device_ingest::cli::{config_cmd, Command, EXIT_CONFIG};
use device_ingest::config::{self, AppConfig};
use device_ingest::http::{self, AppState};
use device_ingest::lifecycle::{Pipeline, PipelineConfig};
use device_ingest::store::{InfluxClient, PointWriter};
use device_ingest::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match Command::parse(&args) {
        Command::Serve => exit_code(run_serve().await),
        Command::ConfigShow => exit_code(config_cmd::run_show()),
        Command::ConfigValidate => exit_code(config_cmd::run_validate()),
        Command::Version => {
            println!("device-ingest {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Command::Help(Some(subcommand)) => {
            print_command_help(&subcommand);
            ExitCode::SUCCESS
        }
        Command::Help(None) => {
            print_usage();
            ExitCode::SUCCESS
        }
        Command::Unknown(command) => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run_serve() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };

    if let Err(e) = telemetry::init_logging(&cfg.log) {
        eprintln!("Logging setup failed: {}", e);
        return 1;
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "device-ingest starting");

    let client = match InfluxClient::new(cfg.influx.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "influx client setup failed");
            return EXIT_CONFIG;
        }
    };
    if let Err(e) = client.ping().await {
        tracing::error!(url = %cfg.influx.url, error = %e, "influx unreachable");
        return EXIT_CONFIG;
    }
    tracing::info!(url = %cfg.influx.url, database = %cfg.influx.database, "influx reachable");

    run_pipeline(&cfg, client).await
}

async fn run_pipeline(cfg: &AppConfig, client: Arc<InfluxClient>) -> i32 {
    let running = Pipeline::new(PipelineConfig::from(cfg), client).start();

    let http_cancel = CancellationToken::new();
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    let mut server = tokio::spawn(http::serve(addr, AppState::new(running.handle()), http_cancel.clone()));

    let mut exit = 0;
    let mut server_done = false;
    tokio::select! {
        () = shutdown_signal() => tracing::info!("shutdown signal received"),
        result = &mut server => {
            log_server_exit(result);
            server_done = true;
            exit = 1;
        }
    }

    http_cancel.cancel();
    if !server_done {
        log_server_exit(server.await);
    }

    let report = running.stop(cfg.shutdown_timeout).await;
    if !report.is_clean() {
        tracing::warn!(?report, "shutdown was not clean");
    }
    exit
}

fn log_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => tracing::info!("http server stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "http server error"),
        Err(e) => tracing::error!(error = %e, "http server task failed"),
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "device-ingest - Device telemetry ingest v{}

USAGE:
    device-ingest [COMMAND]

COMMANDS:
    serve        Run the pipeline and HTTP surface (default)
    config       Inspect configuration (show, validate)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    APP_INFLUX_DATABASE   Target database (required)
    APP_INFLUX_URL        InfluxDB base URL (default: http://localhost:8086)
    APP_PORT              HTTP port (default: 8080)
    APP_COLLECT_INTERVAL  Collection cadence (default: 3s)
    APP_LOG_LEVEL         Log filter (default: RUST_LOG, then info)
    See `device-ingest help config` for the full list.

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error or store unreachable
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "serve" => {
            eprintln!(
                "device-ingest serve - Run the pipeline

USAGE:
    device-ingest serve

DESCRIPTION:
    Loads configuration from the environment, checks that InfluxDB answers
    /ping, then collects a reading every APP_COLLECT_INTERVAL and writes it
    to APP_INFLUX_DATABASE. Serves /healthz, /api/ping, /api/control and
    /api/status on APP_PORT.

    SIGINT or SIGTERM stops the HTTP server, then the collector, then waits
    up to APP_SHUTDOWN_TIMEOUT for pending writes before closing the store.
"
            );
        }
        "config" => {
            eprintln!(
                "device-ingest config - Inspect configuration

USAGE:
    device-ingest config <SUBCOMMAND>

SUBCOMMANDS:
    show           Print effective configuration (password redacted)
    validate       Exit 0 if configuration loads, 2 otherwise

VARIABLES:
    APP_INFLUX_URL, APP_INFLUX_USERNAME, APP_INFLUX_PASSWORD,
    APP_INFLUX_DATABASE, APP_INFLUX_PRECISION, APP_INFLUX_TIMEOUT,
    APP_PORT, APP_DEVICE_ID, APP_COLLECT_INTERVAL, APP_SENSOR_JITTER,
    APP_BUS_QUEUE_CAPACITY, APP_BUS_MAX_CONCURRENCY, APP_SHUTDOWN_TIMEOUT,
    APP_LOG_FORMAT, APP_LOG_LEVEL
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'device-ingest help' for general usage.",
                command
            );
        }
    }
}
