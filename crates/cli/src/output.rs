// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands.

use clap::ValueEnum;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a payload: raw JSON in json mode, otherwise the provided lines.
pub fn emit(format: OutputFormat, payload: &Value, text_lines: Vec<String>) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(payload).unwrap_or_default());
        }
        OutputFormat::Text => {
            for line in text_lines {
                println!("{line}");
            }
        }
    }
}

/// Render a `key: value` line, skipping nulls.
pub fn field(label: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(format!("{label}: {s}")),
        other => Some(format!("{label}: {other}")),
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
