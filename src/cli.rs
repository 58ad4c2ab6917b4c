// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::errors::{Result, RunJobError};

/// Command-line arguments for `runjob`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "runjob",
    version,
    about = "Execute a DAG of job steps defined in a JSON configuration file.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory containing the job configuration file.
    #[arg(short = 'p', long, value_name = "DIR", default_value = "./")]
    pub path: PathBuf,

    /// Directory for log files.
    ///
    /// Default: `<path>/logs`.
    #[arg(short = 'l', long, value_name = "DIR")]
    pub log_path: Option<PathBuf>,

    /// Job configuration file name (JSON).
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: String,

    /// Seconds to sleep between scheduler ticks.
    #[arg(short = 'd', long, value_name = "SECONDS", default_value_t = 1)]
    pub delay: u64,

    /// Comma-delimited list of step keys to force-disable.
    #[arg(short = 'D', long, value_name = "KEYS")]
    pub disabled: Option<String>,

    /// Override the failure email recipient (`mail_to_fail`).
    #[arg(short = 'e', long, value_name = "ADDR")]
    pub email: Option<String>,

    /// Additional variables as a JSON object; highest precedence.
    #[arg(short = 'E', long = "Extras", value_name = "JSON")]
    pub extras: Option<String>,

    /// JSON file of additional variables, resolved relative to --path.
    #[arg(long, value_name = "FILE")]
    pub extras_file: Option<String>,

    /// Seconds between running-steps summaries (minimum 60).
    #[arg(short = 'r', long, value_name = "SECONDS", default_value_t = 900)]
    pub running_delay: u64,

    /// Simulate the job: the full flow runs but no step has side effects.
    #[arg(short = 's', long)]
    pub simulate: bool,

    /// Verbose output (per-step detail in the final summary).
    #[arg(short = 'v', long, default_value_t = true)]
    pub verbose: bool,

    /// Suppress the summary email for successful jobs.
    ///
    /// A failure email is always sent.
    #[arg(long)]
    pub no_success_email: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNJOB_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl CliArgs {
    /// Full path to the job configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.path.join(&self.config)
    }

    /// Log directory, defaulting to `<path>/logs`.
    pub fn effective_log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| self.path.join("logs"))
    }

    /// Step keys from `--disabled`, whitespace stripped.
    pub fn disabled_keys(&self) -> Vec<String> {
        self.disabled
            .as_deref()
            .map(|s| {
                s.replace(' ', "")
                    .split(',')
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks that must hold before anything is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.running_delay < 60 {
            return Err(RunJobError::ConfigError(format!(
                "--running_delay {} is less than 60 seconds",
                self.running_delay
            )));
        }
        if !self.path.is_dir() {
            return Err(RunJobError::ConfigError(format!(
                "--path {} is not a valid directory",
                self.path.display()
            )));
        }
        let config_path = self.config_path();
        if !config_path.is_file() {
            return Err(RunJobError::ConfigNotFound(config_path));
        }
        Ok(())
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
