mod common;

use common::builders::{resolve, JobConfigBuilder, StepConfigBuilder};
use common::fakes::completed;
use common::init_tracing;

use runjob::dag::step::StepStatus;
use runjob::dag::Scheduler;
use runjob::engine::JobOutcome;

/// Drive a scheduler to completion, completing every running step with
/// `Succeeded` unless its key is listed in `failing`. Returns the
/// dispatch order.
fn drive(scheduler: &mut Scheduler, capacity: usize, failing: &[&str]) -> Vec<String> {
    let mut order = Vec::new();
    // Bounded loop so a scheduling bug fails the test instead of
    // spinning forever.
    for _ in 0..1000 {
        scheduler.refresh_ready();
        let batch = scheduler.take_ready(capacity - scheduler.running_count());
        order.extend(batch.iter().cloned());
        let running: Vec<String> = scheduler
            .running_steps()
            .map(|s| s.key.clone())
            .collect();
        if running.is_empty() && batch.is_empty() {
            if scheduler.all_terminal() {
                return order;
            }
        }
        for key in running {
            let status = if failing.contains(&key.as_str()) {
                StepStatus::Failed
            } else {
                StepStatus::Succeeded
            };
            scheduler.record_result(&key, completed(status));
        }
    }
    panic!("scheduler did not reach a terminal state");
}

#[test]
fn linear_chain_runs_in_order() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("a", StepConfigBuilder::os("echo a").build())
        .with_step("b", StepConfigBuilder::os("echo b").dep("a").build())
        .with_step("c", StepConfigBuilder::os("echo c").dep("b").build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    let order = drive(&mut scheduler, 4, &[]);

    assert_eq!(order, vec!["a", "b", "c"]);
    for key in ["a", "b", "c"] {
        assert_eq!(scheduler.status_of(key), Some(StepStatus::Succeeded));
    }
    assert_eq!(scheduler.outcome(), JobOutcome::Success);
}

#[test]
fn fan_out_respects_concurrency_cap() {
    init_tracing();
    let mut builder = JobConfigBuilder::new();
    for key in ["p1", "p2", "p3", "p4"] {
        builder = builder.with_step(key, StepConfigBuilder::os("sleep 1").build());
    }
    let mut scheduler = Scheduler::new(resolve(&builder.build()), &[]);

    scheduler.refresh_ready();
    let first = scheduler.take_ready(2);
    assert_eq!(first, vec!["p1", "p2"]);
    assert_eq!(scheduler.running_count(), 2);

    // Cap reached: nothing more is admitted.
    assert!(scheduler.take_ready(0).is_empty());

    scheduler.record_result("p1", completed(StepStatus::Succeeded));
    scheduler.refresh_ready();
    let second = scheduler.take_ready(2 - scheduler.running_count());
    assert_eq!(second, vec!["p3"]);
    assert!(scheduler.running_count() <= 2);
}

#[test]
fn failure_cancels_descendants_only() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("x", StepConfigBuilder::os("false").build())
        .with_step("y", StepConfigBuilder::os("echo y").dep("x").build())
        .with_step("z", StepConfigBuilder::os("true").build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    let order = drive(&mut scheduler, 4, &["x"]);

    assert!(!order.contains(&"y".to_string()), "y must never be dispatched");
    assert_eq!(scheduler.status_of("x"), Some(StepStatus::Failed));
    assert_eq!(scheduler.status_of("y"), Some(StepStatus::Canceled));
    assert_eq!(scheduler.status_of("z"), Some(StepStatus::Succeeded));
    assert_eq!(scheduler.outcome(), JobOutcome::Failure);
}

#[test]
fn failure_cancellation_is_transitive() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("a", StepConfigBuilder::os("false").build())
        .with_step("b", StepConfigBuilder::os("echo b").dep("a").build())
        .with_step("c", StepConfigBuilder::os("echo c").dep("b").build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    drive(&mut scheduler, 4, &["a"]);

    assert_eq!(scheduler.status_of("b"), Some(StepStatus::Canceled));
    assert_eq!(scheduler.status_of("c"), Some(StepStatus::Canceled));
}

#[test]
fn all_sentinel_runs_strictly_last() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("1", StepConfigBuilder::os("echo 1").build())
        .with_step("2", StepConfigBuilder::os("echo 2").build())
        .with_step("3", StepConfigBuilder::os("echo 3").build())
        .with_step("99", StepConfigBuilder::os("echo done").all_deps().build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    let order = drive(&mut scheduler, 4, &[]);

    assert_eq!(order.last().map(String::as_str), Some("99"));
    assert_eq!(scheduler.status_of("99"), Some(StepStatus::Succeeded));
    assert_eq!(scheduler.outcome(), JobOutcome::Success);
}

#[test]
fn all_sentinel_canceled_when_any_step_fails() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("1", StepConfigBuilder::os("echo 1").build())
        .with_step("2", StepConfigBuilder::os("false").build())
        .with_step("99", StepConfigBuilder::os("echo done").all_deps().build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    let order = drive(&mut scheduler, 4, &["2"]);

    assert!(!order.contains(&"99".to_string()));
    assert_eq!(scheduler.status_of("99"), Some(StepStatus::Canceled));
    assert_eq!(scheduler.outcome(), JobOutcome::Failure);
}

#[test]
fn disabled_step_is_skipped_and_satisfies_dependents() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("a", StepConfigBuilder::os("echo a").enabled(false).build())
        .with_step("b", StepConfigBuilder::os("echo b").dep("a").build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    assert_eq!(scheduler.status_of("a"), Some(StepStatus::Skipped));

    let order = drive(&mut scheduler, 4, &[]);
    assert_eq!(order, vec!["b"]);
    assert_eq!(scheduler.status_of("b"), Some(StepStatus::Succeeded));
    assert_eq!(scheduler.outcome(), JobOutcome::Success);
}

#[test]
fn disabled_flag_from_cli_list() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("a", StepConfigBuilder::os("echo a").build())
        .with_step("b", StepConfigBuilder::os("echo b").dep("a").build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &["a".to_string()]);
    assert_eq!(scheduler.status_of("a"), Some(StepStatus::Skipped));

    let order = drive(&mut scheduler, 4, &[]);
    assert_eq!(order, vec!["b"]);
}

#[test]
fn ready_steps_dispatch_in_ascending_key_order() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("charlie", StepConfigBuilder::os("echo c").build())
        .with_step("alpha", StepConfigBuilder::os("echo a").build())
        .with_step("bravo", StepConfigBuilder::os("echo b").build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    scheduler.refresh_ready();
    assert_eq!(
        scheduler.take_ready(3),
        vec!["alpha", "bravo", "charlie"]
    );
}

#[test]
fn cancel_request_stops_admission_and_cancels_pending() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("a", StepConfigBuilder::os("sleep 5").build())
        .with_step("b", StepConfigBuilder::os("echo b").dep("a").build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    scheduler.refresh_ready();
    assert_eq!(scheduler.take_ready(1), vec!["a"]);

    scheduler.request_cancel();
    assert_eq!(scheduler.status_of("b"), Some(StepStatus::Canceled));
    assert!(scheduler.take_ready(4).is_empty());

    // The running worker observes the cancel and reports CANCELED.
    scheduler.record_result("a", completed(StepStatus::Canceled));
    assert!(scheduler.all_terminal());
    assert_eq!(scheduler.outcome(), JobOutcome::Canceled);
}

#[test]
fn late_result_for_terminal_step_is_ignored() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("a", StepConfigBuilder::os("echo a").build())
        .build();

    let mut scheduler = Scheduler::new(resolve(&cfg), &[]);
    scheduler.refresh_ready();
    scheduler.take_ready(1);
    scheduler.record_result("a", completed(StepStatus::Succeeded));
    // A second result must not overwrite the terminal state.
    scheduler.record_result("a", completed(StepStatus::Failed));
    assert_eq!(scheduler.status_of("a"), Some(StepStatus::Succeeded));
}

#[test]
fn all_steps_disabled_is_an_immediate_success() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .with_step("a", StepConfigBuilder::os("echo a").enabled(false).build())
        .build();

    let scheduler = Scheduler::new(resolve(&cfg), &[]);
    assert!(scheduler.all_terminal());
    assert_eq!(scheduler.outcome(), JobOutcome::Success);
}
