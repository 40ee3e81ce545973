// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn invalid_input_is_usage_error() {
    let err = anyhow::Error::new(ClientError::Api {
        kind: "InvalidInput".into(),
        message: "bad id".into(),
    });
    assert_eq!(ExitError::code_for(&err), 2);
}

#[test]
fn other_api_errors_are_failures() {
    let err = anyhow::Error::new(ClientError::Api {
        kind: "NotFound".into(),
        message: "no such job".into(),
    });
    assert_eq!(ExitError::code_for(&err), 1);
}

#[test]
fn unreachable_daemon_is_failure() {
    let err = anyhow::Error::new(ClientError::Unreachable("connection refused".into()));
    assert_eq!(ExitError::code_for(&err), 1);
}
