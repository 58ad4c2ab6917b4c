#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::sync::mpsc;

use runjob::dag::step::{DispatchedStep, StepResult, StepStatus};
use runjob::engine::JobEvent;
use runjob::errors::Result;
use runjob::exec::StepExecutor;
use runjob::mail::{MailMessage, Mailer};

/// A fake executor that records which steps were dispatched and
/// immediately reports a terminal result for each: `Failed` for keys in
/// `fail_keys`, `Succeeded` otherwise. Keys in `hang_keys` are recorded
/// but never complete, which lets tests exercise cancellation.
pub struct FakeExecutor {
    event_tx: mpsc::Sender<JobEvent>,
    pub dispatched: Arc<Mutex<Vec<String>>>,
    pub fail_keys: HashSet<String>,
    pub hang_keys: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(event_tx: mpsc::Sender<JobEvent>) -> Self {
        Self {
            event_tx,
            dispatched: Arc::new(Mutex::new(Vec::new())),
            fail_keys: HashSet::new(),
            hang_keys: HashSet::new(),
        }
    }

    pub fn failing(mut self, keys: &[&str]) -> Self {
        self.fail_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn hanging(mut self, keys: &[&str]) -> Self {
        self.hang_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn dispatched_keys(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }
}

impl StepExecutor for FakeExecutor {
    fn spawn_step(
        &mut self,
        step: DispatchedStep,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.event_tx.clone();
        let dispatched = Arc::clone(&self.dispatched);
        let fail = self.fail_keys.contains(&step.key);
        let hang = self.hang_keys.contains(&step.key);

        Box::pin(async move {
            dispatched.lock().unwrap().push(step.key.clone());
            if hang {
                return Ok(());
            }
            let result = completed(if fail {
                StepStatus::Failed
            } else {
                StepStatus::Succeeded
            });
            tx.send(JobEvent::StepFinished {
                step: step.key,
                result,
            })
            .await
            .map_err(anyhow::Error::from)?;
            Ok(())
        })
    }
}

/// A terminal result stamped "now", for driving the scheduler directly.
pub fn completed(status: StepStatus) -> StepResult {
    let now = Local::now();
    StepResult {
        status,
        exit_code: match status {
            StepStatus::Succeeded => Some(0),
            StepStatus::Failed => Some(1),
            _ => None,
        },
        started_at: now,
        ended_at: now,
        message: None,
    }
}

/// A mailer that records messages instead of delivering them.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<MailMessage>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(
        &self,
        message: MailMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let sent = Arc::clone(&self.sent);
        Box::pin(async move {
            sent.lock().unwrap().push(message);
            Ok(())
        })
    }
}
