// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time source abstraction.
//!
//! Everything time-sensitive in the platform (event timestamps, controller
//! cooldowns, queue bookkeeping) works in epoch milliseconds; components
//! take a clock so tests can drive those paths deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of wall-clock and monotonic time.
pub trait Clock: Clone + Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Monotonic instant for interval measurement.
    fn now(&self) -> Instant;
}

/// Real system time.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
///
/// Time only moves when a test calls [`FakeClock::advance`]; the epoch
/// value and the monotonic instant share one offset, so interval math and
/// timestamp math stay consistent with each other.
#[derive(Clone)]
pub struct FakeClock {
    base: Instant,
    epoch_base_ms: Arc<AtomicU64>,
    offset_ms: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::at(1_000_000)
    }

    /// Start the clock at a specific epoch timestamp.
    pub fn at(epoch_ms: u64) -> Self {
        Self {
            base: Instant::now(),
            epoch_base_ms: Arc::new(AtomicU64::new(epoch_ms)),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        self.offset_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump the epoch to an absolute value, resetting any accumulated
    /// offset.
    pub fn set_epoch_ms(&self, epoch_ms: u64) {
        self.epoch_base_ms.store(epoch_ms, Ordering::SeqCst);
        self.offset_ms.store(0, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.epoch_base_ms.load(Ordering::SeqCst) + self.offset_ms.load(Ordering::SeqCst)
    }

    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
