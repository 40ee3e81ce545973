// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sl-storage: durable state for the searchlab platform.
//!
//! Every persisted document is written via temp-file-then-rename with an
//! fsync before the rename; corrupt files rotate to `.bak` and recovery
//! starts from defaults rather than refusing to boot.

pub mod bandit_store;
pub mod event_log;
pub mod fsutil;
pub mod job_store;
pub mod policy_store;

pub use bandit_store::BanditStore;
pub use event_log::{EventLog, EventLogError, EVENT_BUDGET_PER_RUN, EVENT_LOG_ROTATE_BYTES};
pub use fsutil::{rotate_bak_path, write_atomic};
pub use job_store::{FakePidProbe, JobStore, JobStoreError, KillPidProbe, PidProbe};
pub use policy_store::{ArmParams, PolicyCatalog, PolicyStoreError, SlaPolicyStore};
