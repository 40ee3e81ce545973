// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit-code policy: 0 = ok, 1 = failure, 2 = usage.

use crate::client::ClientError;

pub struct ExitError;

impl ExitError {
    pub fn code_for(err: &anyhow::Error) -> u8 {
        match err.downcast_ref::<ClientError>() {
            Some(client_err) if client_err.is_usage() => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
#[path = "exit_error_tests.rs"]
mod tests;
