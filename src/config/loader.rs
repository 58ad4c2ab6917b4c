// src/config/loader.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::model::JobConfig;
use crate::errors::{Result, RunJobError};

/// Read and parse a job configuration file.
///
/// This only performs JSON deserialization (including the duplicate
/// step-key check); it does **not** perform semantic validation (DAG
/// correctness, variable resolution). See [`crate::config::validate`].
pub fn load_config(path: impl AsRef<Path>) -> Result<JobConfig> {
    let path = path.as_ref();
    let contents = read_file(path)?;
    parse_config(&contents, path)
}

/// Parse a job configuration from a JSON string.
pub fn parse_config(contents: &str, path: &Path) -> Result<JobConfig> {
    serde_json::from_str(contents).map_err(|err| classify_json_error(err, path))
}

/// Parse a `-E/--Extras` JSON snippet into a variable map.
///
/// Scalar values (strings, numbers, booleans) are accepted and
/// stringified; nested objects and arrays are rejected.
pub fn parse_extras(snippet: &str) -> Result<BTreeMap<String, String>> {
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(snippet).map_err(|err| {
            RunJobError::ConfigError(format!("invalid extras JSON: {err}"))
        })?;

    let mut vars = BTreeMap::new();
    for (name, value) in raw {
        let rendered = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            other => {
                return Err(RunJobError::ConfigError(format!(
                    "extras variable '{name}' must be a scalar, got {other}"
                )))
            }
        };
        vars.insert(name, rendered);
    }
    Ok(vars)
}

/// Load an `--extras_file` JSON object of variables.
pub fn load_extras_file(path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
    let path = path.as_ref();
    let contents = read_file(path)?;
    parse_extras(&contents)
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            RunJobError::ConfigNotFound(path.to_path_buf())
        } else {
            RunJobError::Io(err)
        }
    })
}

/// Map serde_json errors to the crate taxonomy.
///
/// The duplicate-key check inside the model's map visitor surfaces as a
/// custom message; everything else is a plain JSON error.
fn classify_json_error(err: serde_json::Error, path: &Path) -> RunJobError {
    let message = err.to_string();
    match message.strip_prefix("duplicate step key: ") {
        Some(rest) => {
            let key = rest.split(" at line").next().unwrap_or(rest).to_string();
            RunJobError::DuplicateKey(key)
        }
        None => RunJobError::InvalidJson {
            path: path.to_path_buf(),
            message,
        },
    }
}
