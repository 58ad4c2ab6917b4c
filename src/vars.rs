// src/vars.rs

//! Variable environment: built-in defaults, layer merging and `$name`
//! substitution.
//!
//! Four layers are merged in order of increasing precedence:
//! built-ins -> config `variables` -> `--extras_file` -> `-E/--Extras`.
//! The merged environment is frozen before any step runs; substitution
//! is applied exactly once and is not transitive.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};

use crate::errors::{Result, RunJobError};

/// Variables that must be non-empty after merging.
pub const REQUIRED_VARS: &[&str] = &["mail_to", "mail_to_fail"];

#[derive(Debug, Clone)]
pub struct VarEnv {
    vars: BTreeMap<String, String>,
    /// Whether `concurrency` came from a config/extras layer rather than
    /// the CPU-count default.
    concurrency_explicit: bool,
}

impl VarEnv {
    /// Merge all variable layers into a frozen environment.
    pub fn load(
        config_file: &str,
        start_time: DateTime<Local>,
        config_vars: BTreeMap<String, String>,
        extras_file_vars: BTreeMap<String, String>,
        cli_vars: BTreeMap<String, String>,
    ) -> Self {
        let concurrency_explicit = [&config_vars, &extras_file_vars, &cli_vars]
            .iter()
            .any(|layer| layer.contains_key("concurrency"));

        let mut vars = builtins(config_file, start_time);
        vars.extend(config_vars);
        vars.extend(extras_file_vars);
        vars.extend(cli_vars);

        // mail_from defaults to <hostname>@<mail_from_domain> when unset.
        if vars.get("mail_from").map(|s| s.is_empty()).unwrap_or(true) {
            let hostname = vars.get("hostname").cloned().unwrap_or_default();
            let domain = vars.get("mail_from_domain").cloned().unwrap_or_default();
            vars.insert("mail_from".to_string(), format!("{hostname}@{domain}"));
        }

        Self {
            vars,
            concurrency_explicit,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Override a single variable (used for the `-e/--email` flag,
    /// before the environment is handed to the job).
    pub fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Fail if any required variable is missing or empty.
    pub fn validate_required(&self) -> Result<()> {
        for name in REQUIRED_VARS {
            if self.get(name).map(str::is_empty).unwrap_or(true) {
                return Err(RunJobError::MissingRequiredVariable(name.to_string()));
            }
        }
        Ok(())
    }

    /// Effective concurrency cap.
    ///
    /// An explicitly configured value wins as-is; the default is capped
    /// at the host CPU count. Always at least 1.
    pub fn effective_concurrency(&self) -> Result<usize> {
        let raw = self.get("concurrency").unwrap_or_default();
        let value: usize = raw.trim().parse().map_err(|_| {
            RunJobError::ConfigError(format!(
                "concurrency '{raw}' is not a positive integer"
            ))
        })?;

        let cpus = num_cpus::get().max(1);
        let cap = if self.concurrency_explicit {
            value
        } else {
            value.min(cpus)
        };
        Ok(cap.max(1))
    }

    /// Replace every `$name` with its value and `$$` with a literal `$`.
    ///
    /// `$name` starts with an ASCII letter or underscore and extends
    /// over a maximal run of letters, digits and underscores. A `$`
    /// followed by anything else passes through unchanged, which keeps
    /// substitution idempotent on already-resolved strings (`$5` is
    /// never a variable reference). `location` is used in the error
    /// message only.
    pub fn substitute(&self, input: &str, location: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some(&d) if is_ident_start(d) => {
                    let mut name = String::new();
                    while let Some(&d) = chars.peek() {
                        if is_ident_char(d) {
                            name.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    match self.vars.get(&name) {
                        Some(value) => out.push_str(value),
                        None => {
                            return Err(RunJobError::UnknownVariable {
                                name,
                                location: location.to_string(),
                            })
                        }
                    }
                }
                _ => out.push('$'),
            }
        }

        Ok(out)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Built-in defaults, captured once at job initiation.
fn builtins(config_file: &str, start_time: DateTime<Local>) -> BTreeMap<String, String> {
    let fqdn = read_hostname();
    let hostname = fqdn.split('.').next().unwrap_or(&fqdn).to_string();

    let mut vars = BTreeMap::new();
    vars.insert("concurrency".into(), num_cpus::get().to_string());
    vars.insert("config_file".into(), config_file.to_string());
    vars.insert("date".into(), start_time.format("%Y_%m_%d").to_string());
    vars.insert(
        "date_time".into(),
        start_time.format("%Y%m%d_%H%M%S").to_string(),
    );
    vars.insert(
        "date_time_2".into(),
        start_time.format("%Y%m%d-%H%M%S").to_string(),
    );
    vars.insert(
        "date_time_3".into(),
        start_time.format("%Y%m%d%H%M%S").to_string(),
    );
    vars.insert(
        "date_time_4".into(),
        start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    vars.insert(
        "date_time_friendly".into(),
        start_time.format("%c").to_string(),
    );
    vars.insert("hostname".into(), hostname);
    vars.insert("hostname_fqdn".into(), fqdn);
    vars.insert("mail_from".into(), String::new());
    vars.insert("mail_from_domain".into(), String::new());
    vars.insert("mail_to".into(), String::new());
    vars.insert("mail_to_fail".into(), String::new());
    vars.insert("smtp_relay".into(), "localhost".into());
    vars
}

fn read_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}
