// src/engine/mod.rs

//! Job orchestration engine.
//!
//! This module ties together:
//! - the DAG scheduler (owner of all step state)
//! - the tick-loop runtime that reacts to:
//!   - worker completion events
//!   - cancel requests (Ctrl-C)
//!   - the inter-tick delay
//!
//! Workers report results over a single mpsc channel and receive
//! cancellation over a broadcast watch channel; they never mutate
//! shared state.

use std::time::Duration;

use crate::dag::step::StepResult;

/// Canonical step key type used throughout the engine.
pub type StepKey = String;

/// Final outcome of a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failure,
    Canceled,
}

impl JobOutcome {
    /// Process exit code, observable through shell pipelines.
    pub fn exit_code(self) -> i32 {
        match self {
            JobOutcome::Success => 0,
            JobOutcome::Canceled => 2,
            JobOutcome::Failure => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Success => "SUCCESS",
            JobOutcome::Failure => "FAILURE",
            JobOutcome::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events flowing into the runtime from workers and the signal handler.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A worker finished a step with a terminal result.
    StepFinished { step: StepKey, result: StepResult },
    /// Graceful cancellation requested (e.g. Ctrl-C).
    CancelRequested,
}

/// Knobs for the runtime tick loop.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Maximum number of steps in `RUNNING` at once.
    pub concurrency: usize,
    /// Inter-tick delay (`--delay`).
    pub delay: Duration,
    /// Interval between running-steps summaries (`--running_delay`).
    pub running_delay: Duration,
}

pub mod runtime;

pub use runtime::JobRuntime;
