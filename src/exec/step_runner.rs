// src/exec/step_runner.rs

//! Individual step runner.
//!
//! Runs one dispatched step to completion and reports a terminal
//! [`StepResult`] over the job event channel. Each step variant honors
//! the broadcast cancel signal differently:
//!
//! - `os` commands get SIGTERM, then SIGKILL after a grace window;
//! - `sleep` returns at the next poll;
//! - `send_mail` is allowed to finish once the send is in flight.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::dag::step::{DispatchedStep, StepAction, StepResult, StepStatus};
use crate::engine::JobEvent;
use crate::errors::Result;
use crate::mail::{MailMessage, Mailer};

/// Time between SIGTERM and SIGKILL for canceled os steps.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Run a single step and report its terminal result.
///
/// Execution errors (spawn failure, unwritable log file) are recorded
/// as a `FAILED` result rather than propagated; the scheduler confines
/// them to this step and its descendants.
pub async fn run_step(
    step: DispatchedStep,
    event_tx: mpsc::Sender<JobEvent>,
    cancel_rx: watch::Receiver<bool>,
    mailer: Arc<dyn Mailer>,
) {
    let key = step.key.clone();
    let started_at = Local::now();

    let result = match execute(&step, cancel_rx, mailer.as_ref()).await {
        Ok((status, exit_code, message)) => StepResult {
            status,
            exit_code,
            started_at,
            ended_at: Local::now(),
            message,
        },
        Err(err) => {
            error!(step = %key, error = %err, "step execution error");
            StepResult {
                status: StepStatus::Failed,
                exit_code: None,
                started_at,
                ended_at: Local::now(),
                message: Some(err.to_string()),
            }
        }
    };

    if event_tx
        .send(JobEvent::StepFinished { step: key, result })
        .await
        .is_err()
    {
        debug!("runtime gone before step completion could be reported");
    }
}

type Outcome = (StepStatus, Option<i32>, Option<String>);

async fn execute(
    step: &DispatchedStep,
    mut cancel_rx: watch::Receiver<bool>,
    mailer: &dyn Mailer,
) -> Result<Outcome> {
    if step.simulate {
        append_log_line(
            step,
            &format!("simulated - no action taken ({})", step.action.describe()),
        )
        .await?;
        info!(step = %step.key, "step simulated");
        return Ok((StepStatus::Succeeded, Some(0), Some("simulated".to_string())));
    }

    match &step.action {
        StepAction::OsCommand { cmdline } => {
            run_os_command(step, cmdline, &mut cancel_rx).await
        }
        StepAction::Sleep { seconds } => run_sleep(step, *seconds, &mut cancel_rx).await,
        StepAction::SendMail {
            to,
            from,
            subject,
            body,
        } => run_send_mail(step, mailer, to, from, subject, body).await,
    }
}

async fn run_os_command(
    step: &DispatchedStep,
    cmdline: &str,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<Outcome> {
    // Captured output goes to the step's log file, stderr merged into
    // stdout.
    let log = std::fs::File::create(&step.log_path)?;
    let log_err = log.try_clone()?;

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmdline)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()?;

    info!(
        step = %step.key,
        pid = child.id(),
        cmd = %cmdline,
        "step process started"
    );

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res?;
            let code = status.code().unwrap_or(-1);
            if step.resultcode_allowed.contains(&code) {
                Ok((StepStatus::Succeeded, Some(code), None))
            } else {
                Ok((
                    StepStatus::Failed,
                    Some(code),
                    Some(format!(
                        "exit code {code} not in allowed set {:?}",
                        step.resultcode_allowed
                    )),
                ))
            }
        }
        _ = wait_for_cancel(cancel_rx) => {
            terminate_child(&mut child, &step.key).await;
            Ok((
                StepStatus::Canceled,
                None,
                Some("canceled while running".to_string()),
            ))
        }
    }
}

async fn run_sleep(
    step: &DispatchedStep,
    seconds: u64,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<Outcome> {
    append_log_line(step, &format!("sleeping for {seconds} seconds")).await?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {
            Ok((StepStatus::Succeeded, Some(0), None))
        }
        _ = wait_for_cancel(cancel_rx) => {
            Ok((
                StepStatus::Canceled,
                None,
                Some("canceled during sleep".to_string()),
            ))
        }
    }
}

async fn run_send_mail(
    step: &DispatchedStep,
    mailer: &dyn Mailer,
    to: &str,
    from: &str,
    subject: &str,
    body: &str,
) -> Result<Outcome> {
    append_log_line(step, &format!("sending mail to {to}: {subject}")).await?;

    let message = MailMessage {
        to: split_recipients(to),
        from: from.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
    };

    match mailer.send(message).await {
        Ok(()) => Ok((StepStatus::Succeeded, Some(0), None)),
        Err(err) => {
            warn!(step = %step.key, error = %err, "mail delivery failed");
            Ok((StepStatus::Failed, Some(1), Some(err.to_string())))
        }
    }
}

/// Comma-delimited recipient list, whitespace trimmed.
pub fn split_recipients(addresses: &str) -> Vec<String> {
    addresses
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve once the broadcast cancel flag flips to true.
///
/// If the sender side is gone (job already winding down) this pends
/// forever, letting the sibling select branch finish normally.
async fn wait_for_cancel(cancel_rx: &mut watch::Receiver<bool>) {
    let canceled = cancel_rx.wait_for(|canceled| *canceled).await.is_ok();
    if !canceled {
        std::future::pending::<()>().await;
    }
}

/// SIGTERM, grace window, then SIGKILL.
async fn terminate_child(child: &mut Child, key: &str) {
    if let Some(pid) = child.id() {
        info!(step = %key, pid, "sending SIGTERM to canceled step");
        if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(step = %key, pid, error = %err, "SIGTERM failed; process may have exited");
        }
        match tokio::time::timeout(KILL_GRACE, child.wait()).await {
            Ok(_) => return,
            Err(_) => warn!(step = %key, pid, "step ignored SIGTERM; killing"),
        }
    }
    if let Err(err) = child.kill().await {
        warn!(step = %key, error = %err, "failed to kill step process");
    }
}

async fn append_log_line(step: &DispatchedStep, line: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&step.log_path)
        .await?;
    file.write_all(format!("{line}\n").as_bytes()).await?;
    Ok(())
}
