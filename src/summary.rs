// src/summary.rs

//! Final job report: the human-readable summary used for the transcript
//! and notification emails, plus the JSON job record.

use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::dag::step::StepStatus;
use crate::dag::Scheduler;
use crate::engine::JobOutcome;
use crate::errors::Result;
use crate::joblog::LogPaths;

const SEP: &str = "*******************************************";

/// Snapshot of one step for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub key: String,
    pub name: String,
    pub status: StepStatus,
    pub simulated: bool,
    pub resultcode: Option<i32>,
    pub resultcode_allowed: Vec<i32>,
    pub start: Option<String>,
    pub stop: Option<String>,
    pub duration: Option<String>,
    pub message: Option<String>,
    pub log_file: String,
}

/// Full report for a finished job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub hostname_fqdn: String,
    pub config_file: String,
    pub outcome: &'static str,
    pub start_time: String,
    pub stop_time: String,
    pub duration: String,
    pub log_dir: String,
    pub step_count_total: usize,
    pub step_count_succeeded: usize,
    pub step_count_failed: usize,
    pub step_count_skipped: usize,
    pub step_count_canceled: usize,
    pub steps: Vec<StepRecord>,
}

impl JobReport {
    pub fn build(
        scheduler: &Scheduler,
        outcome: JobOutcome,
        hostname_fqdn: &str,
        config_file: &str,
        start_time: DateTime<Local>,
        stop_time: DateTime<Local>,
        paths: &LogPaths,
    ) -> Self {
        let steps: Vec<StepRecord> = scheduler
            .steps()
            .map(|info| StepRecord {
                key: info.key.clone(),
                name: info.name.clone(),
                status: info.status,
                simulated: info.simulate,
                resultcode: info.exit_code,
                resultcode_allowed: info.resultcode_allowed.clone(),
                start: info.started_at.map(format_date),
                stop: info.ended_at.map(format_date),
                duration: info.elapsed().map(format_duration),
                message: info.message.clone(),
                log_file: paths.step_log(&info.key).display().to_string(),
            })
            .collect();

        let count = |status: StepStatus| steps.iter().filter(|s| s.status == status).count();

        Self {
            hostname_fqdn: hostname_fqdn.to_string(),
            config_file: config_file.to_string(),
            outcome: outcome.as_str(),
            start_time: format_date(start_time),
            stop_time: format_date(stop_time),
            duration: format_duration(stop_time - start_time),
            log_dir: paths.dir().display().to_string(),
            step_count_total: steps.len(),
            step_count_succeeded: count(StepStatus::Succeeded),
            step_count_failed: count(StepStatus::Failed),
            step_count_skipped: count(StepStatus::Skipped),
            step_count_canceled: count(StepStatus::Canceled),
            steps,
        }
    }

    /// Render the summary text. With `verbose`, per-step detail blocks
    /// are included after the totals.
    pub fn render_text(&self, verbose: bool) -> String {
        let mut out = Vec::new();

        out.push(SEP.to_string());
        out.push("JOB SUMMARY".to_string());
        out.push(SEP.to_string());
        out.push(format!("    config file:     {}", self.config_file));
        out.push(format!("    log path:        {}", self.log_dir));
        out.push(format!("    outcome:         {}", self.outcome));
        out.push(format!("    start:           {}", self.start_time));
        out.push(format!("    stop:            {}", self.stop_time));
        out.push(format!("    duration:        {}", self.duration));
        out.push(format!("    steps total:     {}", self.step_count_total));
        out.push(format!(
            "    steps succeeded: {}",
            self.step_count_succeeded
        ));
        out.push(format!("    steps failed:    {}", self.step_count_failed));
        out.push(format!("    steps skipped:   {}", self.step_count_skipped));
        out.push(format!(
            "    steps canceled:  {}",
            self.step_count_canceled
        ));
        out.push(SEP.to_string());

        if verbose {
            out.push("JOB DETAIL".to_string());
            out.push(SEP.to_string());
            for record in &self.steps {
                let sim = if record.simulated { " (simulated)" } else { "" };
                out.push(format!("Step: {}", record.key));
                out.push(format!("    name:       {}", record.name));
                out.push(format!("    status:     {}{sim}", record.status));
                out.push(format!(
                    "    resultcode: {} (allowed: {:?})",
                    record
                        .resultcode
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    record.resultcode_allowed
                ));
                out.push(format!(
                    "    start:      {}",
                    record.start.as_deref().unwrap_or("-")
                ));
                out.push(format!(
                    "    stop:       {}",
                    record.stop.as_deref().unwrap_or("-")
                ));
                out.push(format!(
                    "    duration:   {}",
                    record.duration.as_deref().unwrap_or("-")
                ));
                if let Some(message) = &record.message {
                    out.push(format!("    note:       {message}"));
                }
                out.push(format!("    log:        {}", record.log_file));
            }
            out.push(SEP.to_string());
        }

        out.join("\n")
    }

    /// Write the machine-readable job record.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let rendered = serde_json::to_string_pretty(self)
            .map_err(|err| anyhow::anyhow!("serializing job record: {err}"))?;
        std::fs::write(path, rendered)?;
        Ok(())
    }
}

pub fn format_date(ts: DateTime<Local>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `H:MM:SS` rendering for elapsed times.
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds().max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}
