// src/joblog.rs

//! Log surfaces: log directory layout, per-step log files and the
//! job-level transcript.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::errors::{Result, RunJobError};

/// Resolved log-file locations for one job run.
#[derive(Debug, Clone)]
pub struct LogPaths {
    dir: PathBuf,
    /// Config file name up to the first dot, e.g. `nightly` for
    /// `nightly.conf.json`.
    base: String,
}

impl LogPaths {
    /// Create the log directory and compute file names.
    ///
    /// Directory-creation failure is fatal before scheduling begins.
    pub fn prepare(config_file: &str, log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir).map_err(|source| RunJobError::LogDirUncreatable {
            path: log_dir.to_path_buf(),
            source,
        })?;

        let base = config_file
            .split('.')
            .next()
            .unwrap_or(config_file)
            .to_string();

        Ok(Self {
            dir: log_dir.to_path_buf(),
            base,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Captured output file for one step.
    pub fn step_log(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.out", self.base, key))
    }

    /// Job-level transcript file.
    pub fn transcript(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base))
    }

    /// Machine-readable job record written at job end.
    pub fn json_log(&self) -> PathBuf {
        self.dir.join(format!("{}.log.json", self.base))
    }
}

/// Append-only job transcript.
///
/// Every line is timestamped and mirrored to the tracing output.
/// Transcript write failures are downgraded to warnings; losing a
/// transcript line must not take the job down.
pub struct Transcript {
    file: Option<File>,
}

impl Transcript {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Some(file) })
    }

    /// A transcript that only mirrors to tracing; used in tests.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn line(&mut self, message: &str) {
        info!("{message}");
        if let Some(file) = &mut self.file {
            let stamped = format!(
                "{} {message}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            if let Err(err) = file.write_all(stamped.as_bytes()) {
                warn!(error = %err, "failed to write transcript line");
            }
        }
    }

    /// Write a multi-line block, one transcript line per text line.
    pub fn block(&mut self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }
}
