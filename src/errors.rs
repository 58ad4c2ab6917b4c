// src/errors.rs

//! Crate-wide error taxonomy and Result alias.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunJobError {
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid JSON in {}: {message}", .path.display())]
    InvalidJson { path: PathBuf, message: String },

    #[error("required variable '{0}' is not set after merging")]
    MissingRequiredVariable(String),

    #[error("unknown variable '${name}' referenced in {location}")]
    UnknownVariable { name: String, location: String },

    #[error("duplicate step key: {0}")]
    DuplicateKey(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    DanglingDependency { step: String, dependency: String },

    #[error("more than one step declares dependencies = \"ALL\": '{first}' and '{second}'")]
    MultipleAllSteps { first: String, second: String },

    #[error("cycle detected in step graph: {0}")]
    CycleDetected(String),

    #[error("could not create log directory {}: {source}", .path.display())]
    LogDirUncreatable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("mail error: {0}")]
    Mail(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RunJobError>;
