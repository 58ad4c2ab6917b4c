// src/dag/scheduler.rs

//! Per-job scheduling state machine.
//!
//! The scheduler owns the step map and is the only writer of step
//! state. Workers never touch it directly; the runtime feeds completion
//! results in and asks for ready work out.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::graph::StepGraph;
use crate::dag::step::{StepInfo, StepResult, StepStatus};
use crate::engine::{JobOutcome, StepKey};

#[derive(Debug)]
pub struct Scheduler {
    graph: StepGraph,
    steps: BTreeMap<StepKey, StepInfo>,
    /// Set once by an external cancel request; never cleared.
    canceling: bool,
}

impl Scheduler {
    /// Build a scheduler from resolved, validated steps.
    ///
    /// Steps disabled in the config or listed in `disabled` are marked
    /// `SKIPPED` here and satisfy their dependents like successes.
    pub fn new(mut steps: BTreeMap<StepKey, StepInfo>, disabled: &[String]) -> Self {
        for key in disabled {
            match steps.get_mut(key) {
                Some(info) => info.enabled = false,
                None => {
                    warn!(step = %key, "disabled key does not match any step; ignoring")
                }
            }
        }

        for info in steps.values_mut() {
            if !info.enabled {
                info.status = StepStatus::Skipped;
                debug!(step = %info.key, "step disabled; marking SKIPPED");
            }
        }

        let graph = StepGraph::from_steps(&steps);
        let roots: Vec<&str> = graph
            .keys()
            .filter(|key| graph.dependencies_of(key).is_empty())
            .collect();
        debug!(?roots, "dependency graph built");

        Self {
            graph,
            steps,
            canceling: false,
        }
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn step(&self, key: &str) -> Option<&StepInfo> {
        self.steps.get(key)
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepInfo> {
        self.steps.values()
    }

    pub fn status_of(&self, key: &str) -> Option<StepStatus> {
        self.steps.get(key).map(|info| info.status)
    }

    pub fn is_canceling(&self) -> bool {
        self.canceling
    }

    pub fn running_count(&self) -> usize {
        self.steps
            .values()
            .filter(|info| info.status == StepStatus::Running)
            .count()
    }

    pub fn running_steps(&self) -> impl Iterator<Item = &StepInfo> {
        self.steps
            .values()
            .filter(|info| info.status == StepStatus::Running)
    }

    pub fn all_terminal(&self) -> bool {
        self.steps.values().all(|info| info.status.is_terminal())
    }

    /// Advance `PENDING` steps to `READY` or `CANCELED`.
    ///
    /// - Descendants (transitive) of any `FAILED` or `CANCELED` step
    ///   are canceled without running.
    /// - A step becomes `READY` when every declared dependency is
    ///   `SUCCEEDED` or `SKIPPED`.
    /// - The ALL-step becomes `READY` only once every other step is
    ///   terminal, and `CANCELED` as soon as any other step fails.
    ///
    /// Returns the keys canceled by this call, in transition order.
    pub fn refresh_ready(&mut self) -> Vec<StepKey> {
        let mut newly_canceled = self.cancel_descendants_of_failures();

        // Decide first, then mutate.
        let mut to_ready: Vec<StepKey> = Vec::new();

        for info in self.steps.values() {
            if info.status != StepStatus::Pending || info.is_all {
                continue;
            }
            let satisfied = info.deps.iter().all(|dep| {
                self.steps
                    .get(dep)
                    .map(|d| d.status.satisfies_dependents())
                    .unwrap_or(false)
            });
            if satisfied {
                to_ready.push(info.key.clone());
            }
        }

        // The ALL-step depends on everything else, virtually: ready only
        // once every other step is terminal, canceled as soon as any
        // other step fails.
        if let Some(all_key) = self.graph.all_step().map(str::to_string) {
            if self.status_of(&all_key) == Some(StepStatus::Pending) {
                let others = self.steps.values().filter(|o| o.key != all_key);
                let mut any_failure = false;
                let mut all_terminal = true;
                for other in others {
                    if other.status.is_failure_like() {
                        any_failure = true;
                    }
                    if !other.status.is_terminal() {
                        all_terminal = false;
                    }
                }
                if any_failure {
                    if let Some(info) = self.steps.get_mut(&all_key) {
                        info.status = StepStatus::Canceled;
                        info.message =
                            Some("canceled: a step in the job failed".to_string());
                        debug!(step = %all_key, "canceling ALL step; a step in the job failed");
                        newly_canceled.push(all_key);
                    }
                } else if all_terminal {
                    to_ready.push(all_key);
                }
            }
        }

        for key in to_ready {
            if let Some(info) = self.steps.get_mut(&key) {
                info.status = StepStatus::Ready;
                debug!(step = %key, "dependencies satisfied; marking READY");
            }
        }

        newly_canceled
    }

    /// Cancel every not-yet-started descendant of a failed or canceled
    /// step.
    ///
    /// `descendants_of` is transitive, so a single pass settles the
    /// whole downstream subtree. A descendant cannot be `RUNNING` here:
    /// it could only have started after this step terminated well.
    fn cancel_descendants_of_failures(&mut self) -> Vec<StepKey> {
        let failure_roots: Vec<StepKey> = self
            .steps
            .values()
            .filter(|info| info.status.is_failure_like())
            .map(|info| info.key.clone())
            .collect();

        let mut newly_canceled = Vec::new();
        for root in failure_roots {
            for descendant in self.graph.descendants_of(&root) {
                if let Some(info) = self.steps.get_mut(&descendant) {
                    if matches!(info.status, StepStatus::Pending | StepStatus::Ready) {
                        info.status = StepStatus::Canceled;
                        info.message = Some(format!(
                            "canceled: upstream step '{root}' did not succeed"
                        ));
                        debug!(
                            step = %descendant,
                            upstream = %root,
                            "canceling descendant of failed step"
                        );
                        newly_canceled.push(descendant);
                    }
                }
            }
        }
        newly_canceled
    }

    /// Pop up to `capacity` `READY` steps in ascending key order,
    /// marking them `RUNNING`.
    ///
    /// Returns nothing once a cancel has been requested: no new steps
    /// are admitted while the job is shutting down.
    pub fn take_ready(&mut self, capacity: usize) -> Vec<StepKey> {
        if self.canceling || capacity == 0 {
            return Vec::new();
        }

        let mut picked = Vec::new();
        for (key, info) in self.steps.iter_mut() {
            if picked.len() == capacity {
                break;
            }
            if info.status == StepStatus::Ready {
                info.status = StepStatus::Running;
                info.started_at = Some(chrono::Local::now());
                picked.push(key.clone());
            }
        }
        picked
    }

    /// Record a worker's terminal result for a `RUNNING` step.
    ///
    /// A step transitions out of `RUNNING` exactly once; anything else
    /// is logged and dropped.
    pub fn record_result(&mut self, key: &str, result: StepResult) {
        match self.steps.get_mut(key) {
            Some(info) if info.status == StepStatus::Running => {
                debug_assert!(result.status.is_terminal());
                info.status = result.status;
                info.started_at = Some(result.started_at);
                info.ended_at = Some(result.ended_at);
                info.exit_code = result.exit_code;
                info.message = result.message;
            }
            Some(info) => {
                warn!(
                    step = %key,
                    status = %info.status,
                    "result for step that is not RUNNING; ignoring"
                );
            }
            None => warn!(step = %key, "result for unknown step; ignoring"),
        }
    }

    /// Handle an external cancel: stop admitting work and cancel every
    /// step that has not started.
    ///
    /// Returns the keys canceled by this call. Running steps are left
    /// to their workers, which observe the broadcast cancel signal and
    /// report `CANCELED` results.
    pub fn request_cancel(&mut self) -> Vec<StepKey> {
        if self.canceling {
            return Vec::new();
        }
        self.canceling = true;
        info!("cancel requested; no further steps will be admitted");

        let mut canceled = Vec::new();
        for info in self.steps.values_mut() {
            if matches!(info.status, StepStatus::Pending | StepStatus::Ready) {
                info.status = StepStatus::Canceled;
                info.message = Some("canceled: job cancel requested".to_string());
                canceled.push(info.key.clone());
            }
        }
        canceled
    }

    /// Final job outcome.
    ///
    /// `SUCCESS` iff every non-skipped step succeeded; `CANCELED` when a
    /// cancel was requested; `FAILURE` otherwise.
    pub fn outcome(&self) -> JobOutcome {
        if self
            .steps
            .values()
            .all(|info| info.status.satisfies_dependents())
        {
            JobOutcome::Success
        } else if self.canceling {
            JobOutcome::Canceled
        } else {
            JobOutcome::Failure
        }
    }
}
