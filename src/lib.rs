// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod joblog;
pub mod logging;
pub mod mail;
pub mod notify;
pub mod summary;
pub mod vars;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::dag::Scheduler;
use crate::engine::{JobEvent, JobOutcome, JobRuntime, RuntimeOptions};
use crate::errors::Result;
use crate::exec::RealExecutor;
use crate::joblog::{LogPaths, Transcript};
use crate::mail::{Mailer, SmtpMailer};
use crate::notify::Notifier;
use crate::summary::JobReport;
use crate::vars::VarEnv;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and variable resolution
/// - graph validation
/// - log surfaces
/// - scheduler / runtime / executor
/// - Ctrl-C handling
/// - the final summary (transcript, JSON record, email)
pub async fn run(args: CliArgs) -> Result<JobOutcome> {
    args.validate()?;

    let start_time = Local::now();
    let config_path = args.config_path();
    let cfg = config::loader::load_config(&config_path)?;

    // Variable layers, lowest to highest precedence.
    let file_extras = match &args.extras_file {
        Some(name) => config::loader::load_extras_file(args.path.join(name))?,
        None => BTreeMap::new(),
    };
    let cli_extras = match &args.extras {
        Some(snippet) => config::loader::parse_extras(snippet)?,
        None => BTreeMap::new(),
    };
    let mut env = VarEnv::load(
        &args.config,
        start_time,
        cfg.variables.clone(),
        file_extras,
        cli_extras,
    );
    if let Some(addr) = &args.email {
        env.set("mail_to_fail", addr);
    }
    env.validate_required()?;

    // Resolve and validate the step graph before any side effects.
    let mut steps = dag::resolve_steps(&cfg, &env)?;
    config::validate::validate_steps(&steps)?;
    if args.simulate {
        for step in steps.values_mut() {
            step.simulate = true;
        }
    }

    let log_paths = LogPaths::prepare(&args.config, &args.effective_log_path())?;
    let mut transcript = Transcript::open(&log_paths.transcript())?;

    let scheduler = Scheduler::new(steps, &args.disabled_keys());
    let concurrency = env.effective_concurrency()?;
    let options = RuntimeOptions {
        concurrency,
        delay: Duration::from_secs(args.delay.max(1)),
        running_delay: Duration::from_secs(args.running_delay),
    };

    let (event_tx, event_rx) = mpsc::channel::<JobEvent>(64);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    // Ctrl-C -> graceful cancel.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {err}");
                return;
            }
            let _ = tx.send(JobEvent::CancelRequested).await;
        });
    }

    let relay = env.get("smtp_relay").unwrap_or("localhost").to_string();
    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(&relay));
    let executor = RealExecutor::new(event_tx.clone(), cancel_rx, Arc::clone(&mailer));
    let notifier = Notifier::from_env(
        Arc::clone(&mailer),
        &env,
        &args.config,
        !args.no_success_email,
    );

    transcript.line(&format!("JOB START: {}", args.config));
    if args.simulate {
        transcript.line("*** SIMULATE MODE - no steps will be executed ***");
    }
    notifier.job_started().await;

    let runtime = JobRuntime::new(
        scheduler,
        options,
        event_rx,
        executor,
        cancel_tx,
        log_paths.clone(),
        transcript,
    );
    let (scheduler, mut transcript) = runtime.run().await?;

    let stop_time = Local::now();
    let outcome = scheduler.outcome();
    transcript.line(&format!("JOB COMPLETE: {} ({})", args.config, outcome));

    let hostname_fqdn = env.get("hostname_fqdn").unwrap_or_default().to_string();
    let report = JobReport::build(
        &scheduler,
        outcome,
        &hostname_fqdn,
        &args.config,
        start_time,
        stop_time,
        &log_paths,
    );
    transcript.block(&report.render_text(args.verbose));
    if let Err(err) = report.write_json(&log_paths.json_log()) {
        warn!(error = %err, "failed to write JSON job record");
    }

    // Emails always carry the full per-step detail.
    notifier
        .job_finished(outcome, &report.render_text(true))
        .await;

    info!(outcome = %outcome, "job finished");
    Ok(outcome)
}
