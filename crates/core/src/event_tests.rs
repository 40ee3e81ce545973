// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn event(kind: RunEventKind) -> RunEvent {
    RunEvent::new(RunId::new("run-1"), 1_700_000_000_000, kind)
}

#[test]
fn queued_event_serializes_with_type_tag() {
    let e = event(RunEventKind::RunQueued {
        kind: "canary".into(),
        queue_position: 0,
    });
    let v = serde_json::to_value(&e).unwrap();
    assert_eq!(v["event_type"], "RUN_QUEUED");
    assert_eq!(v["run_id"], "run-1");
    assert_eq!(v["queue_position"], 0);
}

#[test]
fn failed_event_carries_stage_and_reason() {
    let e = event(RunEventKind::RunFailed {
        stage: Some("WARMUP".into()),
        reason: "zombie_reaped".into(),
    });
    let v = serde_json::to_value(&e).unwrap();
    assert_eq!(v["event_type"], "RUN_FAILED");
    assert_eq!(v["reason"], "zombie_reaped");
    assert_eq!(v["stage"], "WARMUP");
}

#[test]
fn terminal_detection() {
    assert!(event(RunEventKind::RunSucceeded {}).is_terminal());
    assert!(event(RunEventKind::RunCancelled {}).is_terminal());
    assert!(event(RunEventKind::RunFailed {
        stage: None,
        reason: "boom".into()
    })
    .is_terminal());
    assert!(!event(RunEventKind::Stage {
        stage: "PHASE_A".into(),
        summary: json!({}),
    })
    .is_terminal());
}

#[test]
fn event_roundtrips_through_jsonl_line() {
    let e = event(RunEventKind::SlaVerdict {
        verdict: "WARN".into(),
        detail: json!({"quality": "green", "sla": "yellow", "cost": "green"}),
    });
    let line = serde_json::to_string(&e).unwrap();
    assert!(!line.contains('\n'));
    let parsed: RunEvent = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed, e);
}

#[test]
fn event_type_names_are_stable() {
    let cases: Vec<(RunEventKind, &str)> = vec![
        (
            RunEventKind::RunStarted { pid: Some(1) },
            "RUN_STARTED",
        ),
        (
            RunEventKind::DryRunPlan { plan: json!({}) },
            "DRY_RUN_PLAN",
        ),
        (
            RunEventKind::Winner { winners: json!({}) },
            "WINNER",
        ),
        (
            RunEventKind::Truncated { dropped_after: 2000 },
            "TRUNCATED",
        ),
    ];
    for (kind, name) in cases {
        assert_eq!(kind.event_type(), name);
    }
}
