use std::{env, time::Duration};

use airwatch_core::{
    find_config_file, get_xdg_data_dir, load_config, ConfigSource, DEFAULT_BACKOFF_FACTOR,
    DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT,
};
use clap::{Parser, Subcommand};
use slog::{o, Drain, Level, Logger};

use crate::RetryPolicy;

/// AirVisual nearest-city endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.airvisual.com/v2/nearest_city";

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "Airwatch daemon - polls air-quality data and persists normalized records"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $AIRWATCH_CONFIG, ./airwatch.toml,
    /// $XDG_CONFIG_HOME/airwatch/airwatch.toml, /etc/airwatch/airwatch.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "AIRWATCH_LEVEL")]
    pub level: Option<String>,

    /// AirVisual API key. Required for ingestion; never embed it in source.
    #[arg(long, env = "AIRWATCH_API_KEY")]
    pub api_key: Option<String>,

    /// Air-quality API endpoint to poll
    #[arg(long, env = "AIRWATCH_BASE_URL")]
    pub base_url: Option<String>,

    /// Directory holding the SQLite store
    #[arg(long, env = "AIRWATCH_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Path to the monitoring-locations file (TOML)
    #[arg(long, env = "AIRWATCH_LOCATIONS")]
    pub locations_file: Option<String>,

    /// Maximum fetch attempts per tick
    #[arg(long, env = "AIRWATCH_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Multiplier for the exponential retry delay, in seconds
    #[arg(long, env = "AIRWATCH_BACKOFF_FACTOR")]
    pub backoff_factor: Option<f64>,

    /// Per-request timeout in seconds
    #[arg(long, env = "AIRWATCH_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    #[command(subcommand)]
    #[serde(skip)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Run the hourly scheduler until interrupted
    Run,
    /// One sequential ingestion pass over all locations, then exit
    Once,
    /// Export the full store as a parquet file
    Export {
        /// Output parquet path
        #[arg(short, long)]
        output: String,
    },
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn data_dir(&self) -> String {
        self.data_dir
            .clone()
            .unwrap_or_else(|| get_xdg_data_dir().to_string_lossy().to_string())
    }

    pub fn locations_file(&self) -> String {
        self.locations_file
            .clone()
            .unwrap_or_else(|| "locations.toml".to_string())
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key.clone()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            backoff_factor: self.backoff_factor.unwrap_or(DEFAULT_BACKOFF_FACTOR),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    // Determine config file path
    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("AIRWATCH_CONFIG", "airwatch.toml")
    };

    // Load from config file
    let file_config: Cli = load_config(&source).unwrap_or_default();

    // CLI args override file config (env vars are handled by clap)
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        api_key: cli_args.api_key.or(file_config.api_key),
        base_url: cli_args.base_url.or(file_config.base_url),
        data_dir: cli_args.data_dir.or(file_config.data_dir),
        locations_file: cli_args.locations_file.or(file_config.locations_file),
        max_retries: cli_args.max_retries.or(file_config.max_retries),
        backoff_factor: cli_args.backoff_factor.or(file_config.backoff_factor),
        request_timeout: cli_args.request_timeout.or(file_config.request_timeout),
        command: cli_args.command,
    }
}

pub fn setup_logger(cli: &Cli) -> Logger {
    let level_name = cli
        .level
        .clone()
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_default();
    let log_level = match level_name.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(log_level).fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}
