// src/engine/runtime.rs

//! Tick-loop runtime driving the scheduler.
//!
//! The runtime is the IO shell around the scheduler core: it waits on
//! the completion channel (or the tick delay), feeds results into the
//! scheduler, and hands newly ready steps to the executor backend. The
//! scheduler itself stays synchronous and deterministic, which keeps it
//! testable without Tokio, processes or the filesystem.

use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dag::step::{DispatchedStep, StepStatus};
use crate::dag::Scheduler;
use crate::engine::{JobEvent, RuntimeOptions};
use crate::errors::Result;
use crate::exec::StepExecutor;
use crate::joblog::{LogPaths, Transcript};

pub struct JobRuntime<E: StepExecutor> {
    scheduler: Scheduler,
    options: RuntimeOptions,
    event_rx: mpsc::Receiver<JobEvent>,
    executor: E,
    cancel_tx: watch::Sender<bool>,
    log_paths: LogPaths,
    transcript: Transcript,
    last_running_summary: Instant,
}

impl<E: StepExecutor> JobRuntime<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduler: Scheduler,
        options: RuntimeOptions,
        event_rx: mpsc::Receiver<JobEvent>,
        executor: E,
        cancel_tx: watch::Sender<bool>,
        log_paths: LogPaths,
        transcript: Transcript,
    ) -> Self {
        Self {
            scheduler,
            options,
            event_rx,
            executor,
            cancel_tx,
            log_paths,
            transcript,
            last_running_summary: Instant::now(),
        }
    }

    /// Run the job to completion.
    ///
    /// Returns the scheduler (holding final step state) and the
    /// transcript so the caller can render and dispatch the summary.
    pub async fn run(mut self) -> Result<(Scheduler, Transcript)> {
        info!(
            concurrency = self.options.concurrency,
            delay_secs = self.options.delay.as_secs(),
            "job runtime started"
        );

        // First tick: promote roots and dispatch the initial batch.
        self.advance().await?;

        while !self.scheduler.all_terminal() {
            tokio::select! {
                maybe_event = self.event_rx.recv() => match maybe_event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("event channel closed before all steps finished");
                        break;
                    }
                },
                _ = tokio::time::sleep(self.options.delay) => {}
            }

            // Drain whatever else arrived so one tick observes every
            // completion.
            while let Ok(event) = self.event_rx.try_recv() {
                self.handle_event(event);
            }

            self.advance().await?;
            self.maybe_running_summary();
        }

        info!("all steps terminal; job runtime finished");
        Ok((self.scheduler, self.transcript))
    }

    fn handle_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::StepFinished { step, result } => {
                let verb = match result.status {
                    StepStatus::Succeeded => "COMPLETE",
                    StepStatus::Canceled => "CANCELED",
                    _ => "FAILED",
                };
                let code = result
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let elapsed = result.ended_at - result.started_at;
                self.transcript.line(&format!(
                    "STEP {verb}: {step} resultcode: {code} duration: {}",
                    crate::summary::format_duration(elapsed)
                ));
                self.scheduler.record_result(&step, result);
            }
            JobEvent::CancelRequested => {
                if self.scheduler.is_canceling() {
                    debug!("cancel already in progress");
                    return;
                }
                self.transcript.line("JOB CANCEL REQUESTED");
                let canceled = self.scheduler.request_cancel();
                for key in canceled {
                    self.transcript
                        .line(&format!("STEP CANCELED: {key} (job cancel)"));
                }
                // Broadcast to running workers.
                let _ = self.cancel_tx.send(true);
            }
        }
    }

    /// Promote ready/canceled steps and dispatch up to the concurrency
    /// cap.
    async fn advance(&mut self) -> Result<()> {
        for key in self.scheduler.refresh_ready() {
            self.transcript
                .line(&format!("STEP CANCELED: {key} (dependency failed)"));
        }

        let capacity = self
            .options
            .concurrency
            .saturating_sub(self.scheduler.running_count());
        let batch = self.scheduler.take_ready(capacity);

        let dispatches: Vec<DispatchedStep> = batch
            .iter()
            .filter_map(|key| self.scheduler.step(key))
            .map(|info| {
                DispatchedStep::from_info(info, self.log_paths.step_log(&info.key))
            })
            .collect();

        for dispatch in dispatches {
            self.transcript.line(&format!(
                "STEP SPAWNED: {} (name: {})",
                dispatch.key, dispatch.name
            ));
            self.executor.spawn_step(dispatch).await?;
        }

        Ok(())
    }

    /// Periodic summary of currently running steps with elapsed times.
    fn maybe_running_summary(&mut self) {
        if self.last_running_summary.elapsed() < self.options.running_delay {
            return;
        }
        self.last_running_summary = Instant::now();

        let running: Vec<String> = self
            .scheduler
            .running_steps()
            .map(|info| {
                let elapsed = info
                    .elapsed()
                    .map(crate::summary::format_duration)
                    .unwrap_or_else(|| "-".to_string());
                format!("  {}: {} (name: {})", info.key, elapsed, info.name)
            })
            .collect();

        self.transcript
            .line(&format!("CURRENTLY RUNNING STEPS ({})", running.len()));
        for line in running {
            self.transcript.line(&line);
        }
    }
}
