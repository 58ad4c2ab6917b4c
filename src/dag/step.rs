// src/dag/step.rs

//! Step metadata, the action sum type and runtime state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::config::model::{DepsConfig, JobConfig, StepConfig, StepKind};
use crate::engine::StepKey;
use crate::errors::{Result, RunJobError};
use crate::vars::VarEnv;

/// Lifecycle status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    /// Waiting on dependencies.
    Pending,
    /// All predecessors terminal-good; eligible for dispatch.
    Ready,
    /// Handed to a worker.
    Running,
    Succeeded,
    Failed,
    /// Disabled at init; satisfies dependents like success.
    Skipped,
    /// Never ran (upstream failure or job cancel), or was interrupted
    /// while running.
    Canceled,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped | StepStatus::Canceled
        )
    }

    /// Whether a dependent may treat this predecessor as satisfied.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Skipped)
    }

    pub fn is_failure_like(self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::Canceled)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Ready => "READY",
            StepStatus::Running => "RUNNING",
            StepStatus::Succeeded => "SUCCEEDED",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "SKIPPED",
            StepStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// What a step actually does. Each variant carries exactly the fields
/// the executor needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    OsCommand {
        cmdline: String,
    },
    SendMail {
        to: String,
        from: String,
        subject: String,
        body: String,
    },
    Sleep {
        seconds: u64,
    },
}

impl StepAction {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            StepAction::OsCommand { cmdline } => format!("os: {cmdline}"),
            StepAction::SendMail { to, subject, .. } => {
                format!("send_mail to {to}: {subject}")
            }
            StepAction::Sleep { seconds } => format!("sleep {seconds}s"),
        }
    }
}

/// A fully resolved step plus its runtime state.
///
/// All `$name` references have been substituted by the time one of
/// these exists.
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub key: StepKey,
    pub name: String,
    pub action: StepAction,
    /// Direct dependency keys; empty for the ALL-step.
    pub deps: Vec<StepKey>,
    /// Declared `dependencies = "ALL"`.
    pub is_all: bool,
    pub enabled: bool,
    pub resultcode_allowed: Vec<i32>,
    pub simulate: bool,

    pub status: StepStatus,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

impl StepInfo {
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            (Some(start), None) => Some(Local::now() - start),
            _ => None,
        }
    }
}

/// Everything a worker needs to run one step.
#[derive(Debug, Clone)]
pub struct DispatchedStep {
    pub key: StepKey,
    pub name: String,
    pub action: StepAction,
    pub resultcode_allowed: Vec<i32>,
    pub simulate: bool,
    pub log_path: PathBuf,
}

impl DispatchedStep {
    pub fn from_info(info: &StepInfo, log_path: PathBuf) -> Self {
        Self {
            key: info.key.clone(),
            name: info.name.clone(),
            action: info.action.clone(),
            resultcode_allowed: info.resultcode_allowed.clone(),
            simulate: info.simulate,
            log_path,
        }
    }
}

/// Terminal outcome of one step execution, reported by a worker.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// `Succeeded`, `Failed` or `Canceled`.
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub message: Option<String>,
}

/// Resolve every step of a parsed config against the frozen
/// environment: substitute variables, build actions, validate internal
/// task keywords.
pub fn resolve_steps(
    cfg: &JobConfig,
    env: &VarEnv,
) -> Result<BTreeMap<StepKey, StepInfo>> {
    let mut steps = BTreeMap::new();
    for (key, step_cfg) in &cfg.steps {
        steps.insert(key.clone(), resolve_step(key, step_cfg, env)?);
    }
    Ok(steps)
}

fn resolve_step(key: &str, cfg: &StepConfig, env: &VarEnv) -> Result<StepInfo> {
    let location = format!("step '{key}'");

    let task = env.substitute(&cfg.task, &location)?;
    let name = if cfg.name.is_empty() {
        key.to_string()
    } else {
        env.substitute(&cfg.name, &location)?
    };

    let is_all = match &cfg.dependencies {
        Some(DepsConfig::Sentinel(s)) if s == "ALL" => true,
        Some(DepsConfig::Sentinel(s)) => {
            return Err(RunJobError::ConfigError(format!(
                "step '{key}' has invalid dependencies value '{s}' (expected a list or \"ALL\")"
            )))
        }
        _ => false,
    };

    let deps = cfg
        .dependency_keys()
        .iter()
        .map(|dep| env.substitute(dep, &location))
        .collect::<Result<Vec<_>>>()?;

    let detail = resolve_detail(&cfg.detail, env, &location)?;
    let action = build_action(key, cfg.kind, &task, &detail)?;

    Ok(StepInfo {
        key: key.to_string(),
        name,
        action,
        deps,
        is_all,
        enabled: cfg.enabled,
        resultcode_allowed: cfg.resultcode_allowed.clone(),
        simulate: cfg.simulate,
        status: StepStatus::Pending,
        started_at: None,
        ended_at: None,
        exit_code: None,
        message: None,
    })
}

/// Substitute variables in string-valued detail entries; other value
/// types pass through untouched.
fn resolve_detail(
    detail: &BTreeMap<String, serde_json::Value>,
    env: &VarEnv,
    location: &str,
) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut resolved = BTreeMap::new();
    for (name, value) in detail {
        let value = match value {
            serde_json::Value::String(s) => {
                serde_json::Value::String(env.substitute(s, location)?)
            }
            other => other.clone(),
        };
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}

fn build_action(
    key: &str,
    kind: StepKind,
    task: &str,
    detail: &BTreeMap<String, serde_json::Value>,
) -> Result<StepAction> {
    match kind {
        StepKind::Os => Ok(StepAction::OsCommand {
            cmdline: task.to_string(),
        }),
        StepKind::Internal => match task {
            "send_mail" => Ok(StepAction::SendMail {
                to: detail_string(key, detail, "mail_to")?,
                from: detail_string(key, detail, "mail_from")?,
                subject: detail_string(key, detail, "mail_subject")?,
                body: detail_string(key, detail, "mail_body")?,
            }),
            "sleep" => Ok(StepAction::Sleep {
                seconds: detail_seconds(key, detail)?,
            }),
            other => Err(RunJobError::ConfigError(format!(
                "step '{key}' has unknown internal task '{other}' (expected send_mail or sleep)"
            ))),
        },
    }
}

fn detail_string(
    key: &str,
    detail: &BTreeMap<String, serde_json::Value>,
    field: &str,
) -> Result<String> {
    match detail.get(field) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(RunJobError::ConfigError(format!(
            "step '{key}' detail field '{field}' must be a string, got {other}"
        ))),
        None => Err(RunJobError::ConfigError(format!(
            "step '{key}' is missing detail field '{field}'"
        ))),
    }
}

fn detail_seconds(key: &str, detail: &BTreeMap<String, serde_json::Value>) -> Result<u64> {
    let value = detail.get("seconds").ok_or_else(|| {
        RunJobError::ConfigError(format!("step '{key}' is missing detail field 'seconds'"))
    })?;

    match value {
        serde_json::Value::Number(n) => n.as_u64().ok_or_else(|| {
            RunJobError::ConfigError(format!(
                "step '{key}' detail field 'seconds' must be a non-negative integer"
            ))
        }),
        serde_json::Value::String(s) => s.trim().parse::<u64>().map_err(|_| {
            RunJobError::ConfigError(format!(
                "step '{key}' detail field 'seconds' is not an integer: '{s}'"
            ))
        }),
        other => Err(RunJobError::ConfigError(format!(
            "step '{key}' detail field 'seconds' must be an integer, got {other}"
        ))),
    }
}
