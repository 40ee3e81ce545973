// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_epoch_is_nonzero() {
    assert!(SystemClock.epoch_ms() > 0);
}

#[test]
fn fake_clock_starts_at_requested_epoch() {
    let clock = FakeClock::at(42_000);
    assert_eq!(clock.epoch_ms(), 42_000);
}

#[test]
fn fake_clock_advances_epoch_and_instant_together() {
    let clock = FakeClock::new();
    let start_epoch = clock.epoch_ms();
    let start_instant = clock.now();

    clock.advance(Duration::from_secs(30));

    assert_eq!(clock.epoch_ms(), start_epoch + 30_000);
    assert_eq!(clock.now() - start_instant, Duration::from_secs(30));
}

#[test]
fn fake_clock_is_frozen_between_advances() {
    let clock = FakeClock::new();
    let first = clock.epoch_ms();
    let second = clock.epoch_ms();
    assert_eq!(first, second);
}

#[test]
fn set_epoch_resets_accumulated_offset() {
    let clock = FakeClock::new();
    clock.advance(Duration::from_secs(5));
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn clones_share_the_same_timeline() {
    let clock = FakeClock::at(1_000);
    let other = clock.clone();
    clock.advance(Duration::from_millis(250));
    assert_eq!(other.epoch_ms(), 1_250);
}
