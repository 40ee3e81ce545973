// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submit + lifecycle scenarios: single concurrency, event bracketing,
//! idempotency, cancellation, zombie reconciliation.

use crate::prelude::{engine, quick_ab, wait_terminal};
use sl_core::test_support::running_job_with_pid;
use sl_core::{Clock, JobStatus, RunEventKind, RunId, SystemClock};
use sl_storage::{FakePidProbe, JobStore};

#[tokio::test]
async fn submitted_run_reaches_terminal_state_and_persists() {
    let e = engine();
    let (outcome, _) = e.orchestrator.commit(&quick_ab()).await.expect("commit");
    let job = wait_terminal(&e, outcome.job_id.as_str()).await;
    assert!(matches!(
        job.status,
        JobStatus::Succeeded | JobStatus::Failed
    ));

    // jobs.json on disk contains a matching entry.
    let raw = std::fs::read_to_string(e.dir.path().join("jobs.json")).expect("jobs.json");
    let doc: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert!(doc["jobs"]
        .as_array()
        .expect("jobs array")
        .iter()
        .any(|j| j["id"] == outcome.job_id.as_str()));
}

#[tokio::test]
async fn duplicate_submission_returns_same_run() {
    let e = engine();
    let (first, _) = e.orchestrator.commit(&quick_ab()).await.expect("commit");
    let (second, _) = e.orchestrator.commit(&quick_ab()).await.expect("commit");
    assert_eq!(first.job_id, second.job_id);
    assert!(second.deduplicated);
    wait_terminal(&e, first.job_id.as_str()).await;
}

#[tokio::test]
async fn at_most_one_job_running_under_concurrent_submissions() {
    let e = engine();
    let mut ids = Vec::new();
    for seed in 0..4 {
        let mut request = quick_ab();
        request.seed = seed;
        let (outcome, _) = e.orchestrator.commit(&request).await.expect("commit");
        ids.push(outcome.job_id);
    }

    // Poll the invariant while the queue drains.
    loop {
        let jobs = e.store.list();
        let running = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();
        assert!(running <= 1, "more than one RUNNING job");
        if jobs.iter().all(|j| j.is_terminal()) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn event_log_is_bracketed_and_ordered() {
    let e = engine();
    let (outcome, _) = e.orchestrator.commit(&quick_ab()).await.expect("commit");
    wait_terminal(&e, outcome.job_id.as_str()).await;

    let events = e
        .events
        .read_all(&RunId::new(outcome.job_id.as_str()))
        .expect("events");

    assert!(matches!(events[0].kind, RunEventKind::RunQueued { .. }));
    let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert!(std::ptr::eq(terminal[0], events.last().expect("nonempty")));

    for pair in events.windows(2) {
        assert!(pair[0].ts_ms <= pair[1].ts_ms, "timestamps went backwards");
    }
}

#[tokio::test]
async fn cancelled_queued_run_never_executes() {
    let e = engine();
    // Fill the single-concurrency slot with a long run.
    let mut long = quick_ab();
    long.window_sec = 60;
    long.rounds = 5;
    let (running, _) = e.orchestrator.commit(&long).await.expect("commit");

    let mut queued_request = quick_ab();
    queued_request.seed = 777;
    let (queued, _) = e.orchestrator.commit(&queued_request).await.expect("commit");

    let cancel = e
        .orchestrator
        .manager()
        .cancel(&queued.job_id)
        .await
        .expect("cancel");
    assert_eq!(cancel.status, JobStatus::Cancelled);

    e.orchestrator
        .manager()
        .cancel(&running.job_id)
        .await
        .expect("cancel running");
    let job = wait_terminal(&e, running.job_id.as_str()).await;
    assert_eq!(job.status, JobStatus::Cancelled);

    // The cancelled-queued run produced no RUN_STARTED event.
    let events = e
        .events
        .read_all(&RunId::new(queued.job_id.as_str()))
        .expect("events");
    assert!(!events
        .iter()
        .any(|e| matches!(e.kind, RunEventKind::RunStarted { .. })));
    assert!(matches!(
        events.last().expect("events").kind,
        RunEventKind::RunCancelled {}
    ));
}

#[tokio::test]
async fn zombie_jobs_are_reaped_on_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("jobs.json");

    // First life: a RUNNING job with a pid that no longer exists.
    {
        let store = JobStore::load(&path).expect("store");
        store
            .upsert(running_job_with_pid("zombie-1", 4_111_222))
            .expect("upsert");
    }

    // Second life: boot reconciliation repairs it.
    let store = JobStore::load(&path).expect("store");
    let mut journaled = Vec::new();
    let reaped = store
        .reconcile_on_boot(&FakePidProbe::default(), SystemClock.epoch_ms(), |job| {
            journaled.push(job.id.as_str().to_string());
        })
        .expect("reconcile");

    assert_eq!(reaped.len(), 1);
    assert_eq!(journaled, vec!["zombie-1"]);
    let job = store.get(&sl_core::JobId::new("zombie-1")).expect("job");
    assert_eq!(job.status, JobStatus::Aborted);
    assert_eq!(job.reason.as_deref(), Some("zombie_reaped"));
    assert!(store.running().expect("running query").is_none());
}
