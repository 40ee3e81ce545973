// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller seed scenario: decrease fires once, then cooldown holds.

use sl_control::{AimdConfig, AimdController, FlowAction, FlowMetrics};

fn overloaded() -> FlowMetrics {
    FlowMetrics {
        p95_ms: 200.0,
        qps: 100.0,
        err_rate: 0.0,
        queue_depth: 0,
    }
}

#[test]
fn decrease_then_cooldown_hold() {
    let mut controller = AimdController::new(AimdConfig::with_target(100.0));

    let first = controller.update(0, &overloaded());
    assert_eq!(first.action, FlowAction::Decrease);

    let second = controller.update(1_000, &overloaded());
    assert_eq!(second.action, FlowAction::Hold);
    assert!(
        second.reason.contains("cooldown"),
        "reason was {:?}",
        second.reason
    );

    let third = controller.update(2_000, &overloaded());
    assert_eq!(third.action, FlowAction::Hold);
}

#[test]
fn multiplier_never_leaves_bounds_under_abuse() {
    let mut controller = AimdController::new(AimdConfig::with_target(100.0));
    let mut now = 0u64;
    for p95 in [0.0, 10_000.0, 1.0, 5_000.0, 50.0, 100_000.0].iter().cycle().take(500) {
        let rec = controller.update(now, &FlowMetrics {
            p95_ms: *p95,
            qps: 0.0,
            err_rate: 0.0,
            queue_depth: 0,
        });
        now += 7_000;
        assert!(controller.multiplier() >= 0.1 - 1e-9);
        assert!(controller.multiplier() <= 2.0 + 1e-9);
        assert!(rec.concurrency >= 1);
        assert!(rec.batch_size >= 1);
    }
}
