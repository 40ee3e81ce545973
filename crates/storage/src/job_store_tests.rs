// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sl_core::test_support::{job_in_status, queued_job, running_job_with_pid};
use sl_core::ErrorKind;
use tempfile::tempdir;

fn store(dir: &tempfile::TempDir) -> JobStore {
    JobStore::load(dir.path().join("jobs.json")).unwrap()
}

#[test]
fn load_missing_file_starts_empty() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    assert!(store.list().is_empty());
}

#[test]
fn upsert_persists_and_reloads() {
    let dir = tempdir().unwrap();
    {
        let store = store(&dir);
        store.upsert(queued_job("j1")).unwrap();
        store.upsert(queued_job("j2")).unwrap();
    }
    let store = store(&dir);
    assert_eq!(store.list().len(), 2);
    assert!(store.get(&JobId::new("j1")).is_some());
}

#[test]
fn document_has_schema_version_and_updated_at() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    store.upsert(queued_job("j1")).unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["schema_version"], 1);
    assert!(doc["updated_at"].as_str().is_some());
    assert!(doc["jobs"].is_array());
}

#[test]
fn corrupt_document_rotates_to_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    std::fs::write(&path, "{broken").unwrap();

    let store = JobStore::load(&path).unwrap();
    assert!(store.list().is_empty());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn list_is_newest_first() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    let mut old = queued_job("old");
    old.queued_at_ms = 100;
    let mut new = queued_job("new");
    new.queued_at_ms = 900;
    store.upsert(old).unwrap();
    store.upsert(new).unwrap();

    let ids: Vec<String> = store
        .list()
        .into_iter()
        .map(|j| j.id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["new", "old"]);
}

#[test]
fn queue_positions_are_stable() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        let mut job = queued_job(id);
        job.queued_at_ms = 100 + i as u64;
        store.upsert(job).unwrap();
    }
    assert_eq!(store.queue_position(&JobId::new("a")), Some(0));
    assert_eq!(store.queue_position(&JobId::new("c")), Some(2));
    assert_eq!(store.queue_position(&JobId::new("missing")), None);
}

#[test]
fn find_by_fingerprint_returns_most_recent() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    let mut a = queued_job("a");
    a.request_fingerprint = "same".into();
    a.queued_at_ms = 100;
    let mut b = queued_job("b");
    b.request_fingerprint = "same".into();
    b.queued_at_ms = 200;
    store.upsert(a).unwrap();
    store.upsert(b).unwrap();

    let found = store.find_by_fingerprint("same").unwrap();
    assert_eq!(found.id, "b");
}

#[test]
fn running_rejects_duplicate_running_jobs() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    store
        .upsert(job_in_status("r1", sl_core::JobStatus::Running))
        .unwrap();
    store
        .upsert(job_in_status("r2", sl_core::JobStatus::Running))
        .unwrap();

    let err = store.running().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Fatal);
}

#[test]
fn update_missing_job_is_not_found() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    let err = store
        .update(&JobId::new("ghost"), |_| Ok(()))
        .unwrap_err();
    let core: sl_core::CoreError = err.into();
    assert_eq!(core.kind, ErrorKind::NotFound);
}

#[test]
fn reconcile_reaps_dead_running_jobs() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    store.upsert(running_job_with_pid("zombie-1", 999_999)).unwrap();
    store.upsert(running_job_with_pid("alive-1", 4242)).unwrap();
    store.upsert(queued_job("queued-1")).unwrap();

    let probe = FakePidProbe::with_live([4242]);
    let mut journaled = Vec::new();
    let reaped = store
        .reconcile_on_boot(&probe, 2_000_000, |job| {
            journaled.push(job.id.as_str().to_string());
        })
        .unwrap();

    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].id, "zombie-1");
    assert_eq!(journaled, vec!["zombie-1"]);

    let zombie = store.get(&JobId::new("zombie-1")).unwrap();
    assert_eq!(zombie.status, sl_core::JobStatus::Aborted);
    assert_eq!(zombie.reason.as_deref(), Some("zombie_reaped"));
    assert!(zombie.pid.is_none());

    let alive = store.get(&JobId::new("alive-1")).unwrap();
    assert_eq!(alive.status, sl_core::JobStatus::Running);
}

#[test]
fn reconcile_reaps_running_job_without_pid() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    store
        .upsert(job_in_status("no-pid", sl_core::JobStatus::Running))
        .unwrap();

    let reaped = store
        .reconcile_on_boot(&FakePidProbe::default(), 2_000_000, |_| {})
        .unwrap();
    assert_eq!(reaped.len(), 1);
}

#[test]
fn reconcile_persists_repairs() {
    let dir = tempdir().unwrap();
    {
        let store = store(&dir);
        store.upsert(running_job_with_pid("z", 1)).unwrap();
        store
            .reconcile_on_boot(&FakePidProbe::default(), 2_000_000, |_| {})
            .unwrap();
    }
    let store = store(&dir);
    assert_eq!(
        store.get(&JobId::new("z")).unwrap().status,
        sl_core::JobStatus::Aborted
    );
}
