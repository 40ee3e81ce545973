// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::worker::TaskWorker;
use serde_json::json;
use sl_storage::{EventLog, JobStore};
use std::time::Duration;
use tempfile::tempdir;

/// Factory that reads the behavior marker out of the submitted params.
fn test_factory() -> WorkerFactory {
    Arc::new(|job: &Job| {
        let params = job.cmd.last().cloned().unwrap_or_default();
        let behavior = serde_json::from_str::<serde_json::Value>(&params)
            .ok()
            .and_then(|v| v["behavior"].as_str().map(str::to_string))
            .unwrap_or_else(|| "ok".to_string());

        Box::new(TaskWorker::new(move |cancel| {
            tokio::spawn(async move {
                match behavior.as_str() {
                    "fail" => Err(crate::EngineError::Worker("PHASE_A: backend down".into())),
                    "sleep" => {
                        for _ in 0..600 {
                            if cancel.load(std::sync::atomic::Ordering::SeqCst) {
                                return Ok(());
                            }
                            tokio::time::sleep(Duration::from_millis(5)).await;
                        }
                        Ok(())
                    }
                    _ => Ok(()),
                }
            })
        }))
    })
}

struct Fixture {
    manager: Arc<JobManager>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let store = Arc::new(JobStore::load(dir.path().join("jobs.json")).unwrap());
    let events = Arc::new(EventLog::new(dir.path().join("events")));
    let manager = JobManager::new(
        store,
        events,
        SystemClock,
        ManagerConfig::new(dir.path().join("logs")),
        test_factory(),
    );
    manager.spawn_worker_loop();
    Fixture {
        manager,
        _dir: dir,
    }
}

async fn wait_terminal(manager: &JobManager, id: &JobId) -> Job {
    for _ in 0..600 {
        let job = manager.status(id).unwrap();
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} never reached a terminal state");
}

#[tokio::test]
async fn submit_runs_to_success() {
    let f = fixture();
    let outcome = f
        .manager
        .submit(JobKind::FiqaFast, json!({"behavior": "ok", "dataset_name": "fiqa"}))
        .await
        .unwrap();
    assert!(!outcome.deduplicated);
    assert_eq!(outcome.status, JobStatus::Queued);

    let job = wait_terminal(&f.manager, &outcome.job_id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.started_at_ms.is_some());
    assert!(job.finished_at_ms.is_some());
}

#[tokio::test]
async fn identical_submissions_are_deduplicated() {
    let f = fixture();
    let params = json!({"behavior": "sleep", "dataset_name": "fiqa"});
    let first = f.manager.submit(JobKind::Ab, params.clone()).await.unwrap();
    let second = f.manager.submit(JobKind::Ab, params).await.unwrap();

    assert_eq!(first.job_id, second.job_id);
    assert!(second.deduplicated);
    f.manager.cancel(&first.job_id).await.unwrap();
}

#[tokio::test]
async fn different_params_get_different_jobs() {
    let f = fixture();
    let a = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "ok", "n": 1}))
        .await
        .unwrap();
    let b = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "ok", "n": 2}))
        .await
        .unwrap();
    assert_ne!(a.job_id, b.job_id);
}

#[tokio::test]
async fn fingerprint_is_order_insensitive() {
    let a = fingerprint(JobKind::Ab, &json!({"x": 1, "y": 2}));
    let b = fingerprint(JobKind::Ab, &json!({"y": 2, "x": 1}));
    assert_eq!(a, b);
    let c = fingerprint(JobKind::Canary, &json!({"x": 1, "y": 2}));
    assert_ne!(a, c);
}

#[tokio::test]
async fn only_one_job_runs_at_a_time() {
    let f = fixture();
    let first = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "sleep", "n": 1}))
        .await
        .unwrap();
    let second = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "sleep", "n": 2}))
        .await
        .unwrap();

    // While anything is in flight, at most one job is RUNNING.
    for _ in 0..50 {
        let running = f
            .manager
            .list(10)
            .into_iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();
        assert!(running <= 1, "two jobs running concurrently");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let detail = f.manager.detail(&second.job_id).unwrap();
    if detail.job.status == JobStatus::Queued {
        assert_eq!(detail.queue_position, Some(0));
    }

    f.manager.cancel(&first.job_id).await.unwrap();
    f.manager.cancel(&second.job_id).await.unwrap();
    wait_terminal(&f.manager, &second.job_id).await;
}

#[tokio::test]
async fn failed_job_records_reason_and_stage() {
    let f = fixture();
    let outcome = f
        .manager
        .submit(JobKind::Canary, json!({"behavior": "fail"}))
        .await
        .unwrap();
    let job = wait_terminal(&f.manager, &outcome.job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.reason.as_deref().unwrap_or("").contains("backend down"));

    let events = f
        .manager
        .events()
        .read_all(&RunId::new(outcome.job_id.as_str()))
        .unwrap();
    let last = events.last().unwrap();
    match &last.kind {
        RunEventKind::RunFailed { stage, reason } => {
            assert_eq!(stage.as_deref(), Some("PHASE_A"));
            assert_eq!(reason, "backend down");
        }
        other => panic!("expected RUN_FAILED, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_queued_job_is_immediate() {
    let f = fixture();
    // Occupy the loop so the next submit stays queued.
    let blocker = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "sleep", "n": 1}))
        .await
        .unwrap();
    let queued = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "sleep", "n": 2}))
        .await
        .unwrap();

    let outcome = f.manager.cancel(&queued.job_id).await.unwrap();
    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert!(!outcome.signalled);

    f.manager.cancel(&blocker.job_id).await.unwrap();
    let job = wait_terminal(&f.manager, &blocker.job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_running_job_reaches_cancelled() {
    let f = fixture();
    let outcome = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "sleep"}))
        .await
        .unwrap();

    // Wait for the worker loop to pick it up.
    for _ in 0..200 {
        if f.manager.status(&outcome.job_id).unwrap().status == JobStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let cancel = f.manager.cancel(&outcome.job_id).await.unwrap();
    assert!(cancel.signalled);

    let job = wait_terminal(&f.manager, &outcome.job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_terminal_job_is_idempotent() {
    let f = fixture();
    let outcome = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "ok"}))
        .await
        .unwrap();
    wait_terminal(&f.manager, &outcome.job_id).await;

    let first = f.manager.cancel(&outcome.job_id).await.unwrap();
    let second = f.manager.cancel(&outcome.job_id).await.unwrap();
    assert_eq!(first.status, JobStatus::Succeeded);
    assert_eq!(second.status, JobStatus::Succeeded);
}

#[tokio::test]
async fn cancel_unknown_job_is_not_found() {
    let f = fixture();
    let err = f.manager.cancel(&JobId::new("ghost")).await.unwrap_err();
    assert_eq!(err.kind, sl_core::ErrorKind::NotFound);
}

#[tokio::test]
async fn event_log_brackets_each_run() {
    let f = fixture();
    let outcome = f
        .manager
        .submit(JobKind::Ab, json!({"behavior": "ok"}))
        .await
        .unwrap();
    wait_terminal(&f.manager, &outcome.job_id).await;

    let events = f
        .manager
        .events()
        .read_all(&RunId::new(outcome.job_id.as_str()))
        .unwrap();
    assert!(matches!(events[0].kind, RunEventKind::RunQueued { .. }));
    assert!(matches!(
        events.last().unwrap().kind,
        RunEventKind::RunSucceeded {}
    ));
    let terminal_count = events
        .iter()
        .filter(|e| e.is_terminal())
        .count();
    assert_eq!(terminal_count, 1);
    for pair in events.windows(2) {
        assert!(pair[0].ts_ms <= pair[1].ts_ms);
    }
}

#[tokio::test]
async fn logs_for_unknown_job_is_not_found() {
    let f = fixture();
    let err = f.manager.logs(&JobId::new("ghost"), 10).unwrap_err();
    assert_eq!(err.kind, sl_core::ErrorKind::NotFound);
}

#[test]
fn split_stage_recognizes_known_stages() {
    assert_eq!(
        split_stage("PHASE_B: deadline exceeded"),
        (Some("PHASE_B".to_string()), "deadline exceeded".to_string())
    );
    assert_eq!(
        split_stage("something else entirely"),
        (None, "something else entirely".to_string())
    );
}
