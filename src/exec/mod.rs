// src/exec/mod.rs

//! Step execution.
//!
//! The runtime talks to a [`StepExecutor`] instead of spawning
//! processes directly. This makes it easy to swap in a fake executor in
//! tests while keeping the production implementation in
//! [`step_runner`].
//!
//! - [`RealExecutor`] is the default backend: each dispatched step runs
//!   in its own Tokio task and reports a terminal [`crate::dag::StepResult`]
//!   over the job event channel.
//! - Tests can provide their own `StepExecutor` that records dispatches
//!   and emits `StepFinished` events directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::dag::step::DispatchedStep;
use crate::engine::JobEvent;
use crate::errors::Result;
use crate::mail::Mailer;

pub mod step_runner;

/// Trait abstracting how dispatched steps are executed.
pub trait StepExecutor: Send {
    /// Start executing one step. Must not block on the step itself; the
    /// terminal result is reported asynchronously as a
    /// [`JobEvent::StepFinished`].
    fn spawn_step(
        &mut self,
        step: DispatchedStep,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production executor backend.
///
/// Holds the completion-event sender, the broadcast cancel signal and
/// the mailer used by `send_mail` steps.
pub struct RealExecutor {
    event_tx: mpsc::Sender<JobEvent>,
    cancel_rx: watch::Receiver<bool>,
    mailer: Arc<dyn Mailer>,
}

impl RealExecutor {
    pub fn new(
        event_tx: mpsc::Sender<JobEvent>,
        cancel_rx: watch::Receiver<bool>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            event_tx,
            cancel_rx,
            mailer,
        }
    }
}

impl StepExecutor for RealExecutor {
    fn spawn_step(
        &mut self,
        step: DispatchedStep,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let event_tx = self.event_tx.clone();
        let cancel_rx = self.cancel_rx.clone();
        let mailer = Arc::clone(&self.mailer);

        Box::pin(async move {
            tokio::spawn(step_runner::run_step(step, event_tx, cancel_rx, mailer));
            Ok(())
        })
    }
}
