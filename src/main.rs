//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `route_atlas` library that handles:
//! - Command-line argument parsing
//! - Environment variable loading (.env file)
//! - Logger initialization
//! - Printing command output
//!
//! All core functionality is implemented in the library crate.

use anyhow::{Context, Result};
use clap::Parser;
use std::process;

use route_atlas::initialization::init_logger_with;
use route_atlas::{run, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    // Try loading from current directory first, then from the executable's directory
    if dotenvy::dotenv().is_err() {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let env_path = exe_dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                }
            }
        }
    }

    let config = Config::parse();

    let log_level = config.log_level.clone();
    let log_format = config.log_format.clone();
    init_logger_with(log_level.into(), log_format).context("Failed to initialize logger")?;

    match run(config).await {
        Ok(report) => {
            print!("{}", report.output);
            if report.skipped > 0 {
                eprintln!(
                    "Skipped {} capture file{} that could not be decoded",
                    report.skipped,
                    if report.skipped == 1 { "" } else { "s" }
                );
            }
            log::debug!(
                "Finished with {} item(s) in {:.2}s",
                report.items,
                report.elapsed_seconds
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("route_atlas error: {:#}", e);
            process::exit(1);
        }
    }
}
