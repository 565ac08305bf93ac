//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::constants::{
    CACHE_EXPIRY_DAYS, DEFAULT_API_BASE_URL, DEFAULT_LANGUAGE, DEFAULT_USER_AGENT, DB_PATH,
    HTTP_TIMEOUT_SECS,
};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Command-line options and configuration.
///
/// Global options configure logging, the cache database and the geolocation
/// client; the subcommand selects what to do.
///
/// # Examples
///
/// ```bash
/// # Collapse a directory of traceroute captures and locate every hop
/// route_atlas routes ./traces --geolocate
///
/// # Look up a couple of addresses, printing JSON
/// route_atlas geolocate 1.1.1.1 8.8.8.8 --json
///
/// # Use a custom cache database
/// route_atlas --db-path ./cache.db cooldown
/// ```
#[derive(Debug, Clone, Parser)]
#[command(
    name = "route_atlas",
    about = "Collapses traceroute captures into canonical routes and geolocates their hops."
)]
pub struct Config {
    /// Log level: error|warn|info|debug|trace
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Geolocation cache database path (SQLite file)
    #[arg(long, global = true, env = "ROUTE_ATLAS_DB_PATH", default_value = DB_PATH)]
    pub db_path: PathBuf,

    /// Base URL of the ip-api.com compatible geolocation service
    #[arg(long, global = true, env = "ROUTE_ATLAS_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Language for place names returned by the geolocation service
    #[arg(long, global = true, default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = HTTP_TIMEOUT_SECS)]
    pub timeout_seconds: u64,

    /// Days after which cached geolocation records are refetched
    #[arg(long, global = true, default_value_t = CACHE_EXPIRY_DAYS)]
    pub cache_ttl_days: i64,

    /// HTTP User-Agent header value
    #[arg(long, global = true, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    #[command(subcommand)]
    pub command: Command,
}

/// What the binary should do.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Collapse traceroute captures into canonical routes
    Routes {
        /// Directory containing traceroute capture JSON files
        dir: PathBuf,
        /// Annotate every hop with its geolocation
        #[arg(long)]
        geolocate: bool,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Geolocate one or more addresses
    Geolocate {
        /// Addresses to look up
        #[arg(required = true)]
        addresses: Vec<std::net::IpAddr>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Summarize ping captures per destination
    Ping {
        /// Directory containing ping capture JSON files
        dir: PathBuf,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the geolocation rate-limit cooldown
    Cooldown,
    /// Delete expired geolocation cache entries
    Purge,
}

impl Config {
    /// Builds a configuration with default global options for `command`.
    pub fn with_command(command: Command) -> Self {
        Config {
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            db_path: PathBuf::from(DB_PATH),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            timeout_seconds: HTTP_TIMEOUT_SECS,
            cache_ttl_days: CACHE_EXPIRY_DAYS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            command,
        }
    }
}
