// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn field_skips_null() {
    assert!(field("reason", &json!(null)).is_none());
}

#[test]
fn field_renders_strings_bare() {
    assert_eq!(
        field("status", &json!("RUNNING")).as_deref(),
        Some("status: RUNNING")
    );
}

#[test]
fn field_renders_numbers() {
    assert_eq!(
        field("queue_position", &json!(2)).as_deref(),
        Some("queue_position: 2")
    );
}
