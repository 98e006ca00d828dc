//! CLI module for device-ingest commands.
//!
//! ## Usage
//!
//! ```bash
//! device-ingest                   # Run the pipeline (same as `serve`)
//! device-ingest config show       # Print effective configuration
//! device-ingest config validate   # Exit 0 if configuration loads
//! ```

pub mod config_cmd;

/// Exit code for configuration errors and an unreachable store at startup.
pub const EXIT_CONFIG: i32 = 2;

/// Top-level command parsed from argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    ConfigShow,
    ConfigValidate,
    Version,
    Help(Option<String>),
    Unknown(String),
}

impl Command {
    /// Parse from arguments, program name excluded.
    pub fn parse(args: &[String]) -> Self {
        let first = args.first().map(|s| s.as_str()).unwrap_or("serve");
        match first {
            "serve" | "" => Self::Serve,
            "config" => match args.get(1).map(|s| s.as_str()).unwrap_or("show") {
                "show" => Self::ConfigShow,
                "validate" => Self::ConfigValidate,
                other => Self::Unknown(format!("config {}", other)),
            },
            "version" | "--version" | "-V" => Self::Version,
            "help" | "--help" | "-h" => Self::Help(args.get(1).cloned()),
            other => Self::Unknown(other.to_string()),
        }
    }
}
