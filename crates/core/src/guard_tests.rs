// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::ErrorKind;
use proptest::prelude::*;
use std::path::Path;
use yare::parameterized;

#[parameterized(
    simple = { "job-1" },
    underscores = { "run_2026_02_01" },
    single_char = { "x" },
    mixed = { "Fiqa-Fast_01" },
)]
fn accepts_valid_ids(id: &str) {
    assert!(validate_job_id(id).is_ok());
}

#[parameterized(
    empty = { "" },
    traversal = { "../../etc/passwd" },
    slash = { "a/b" },
    space = { "a b" },
    dot = { "a.b" },
    unicode = { "jöb" },
    newline = { "a\nb" },
)]
fn rejects_invalid_ids(id: &str) {
    let err = validate_job_id(id).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

#[test]
fn rejects_over_length_id() {
    let id = "a".repeat(MAX_JOB_ID_LEN + 1);
    assert!(validate_job_id(&id).is_err());
    let id = "a".repeat(MAX_JOB_ID_LEN);
    assert!(validate_job_id(&id).is_ok());
}

#[test]
fn path_resolves_under_root() {
    let root = Path::new("/data/reports");
    let resolved = validate_path(root, Path::new("run-1/winners.json")).unwrap();
    assert_eq!(resolved, Path::new("/data/reports/run-1/winners.json"));
}

#[parameterized(
    parent = { "../secrets" },
    nested_parent = { "a/../../secrets" },
    absolute = { "/etc/passwd" },
)]
fn path_rejects_escapes(p: &str) {
    let root = Path::new("/data/reports");
    let err = validate_path(root, Path::new(p)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

#[test]
fn path_allows_curdir_components() {
    let root = Path::new("/data");
    let resolved = validate_path(root, Path::new("./a/b")).unwrap();
    assert_eq!(resolved, Path::new("/data/a/b"));
}

proptest! {
    /// Any id that validates consists solely of allowed characters and
    /// never round-trips through a path separator.
    #[test]
    fn valid_ids_are_separator_free(id in "[A-Za-z0-9_\\-]{1,200}") {
        prop_assert!(validate_job_id(&id).is_ok());
        prop_assert!(!id.contains('/'));
        prop_assert!(!id.contains(".."));
    }

    /// Validation never panics on arbitrary input.
    #[test]
    fn validation_total_on_arbitrary_strings(id in "\\PC*") {
        let _ = validate_job_id(&id);
    }
}
