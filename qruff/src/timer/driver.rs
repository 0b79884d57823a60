/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Real-time driver for [`TimerQueue`].
//!
//! Maps the queue's logical millisecond clock onto `tokio::time` and advances
//! it as wall time passes.  Both drivers must run on a current-thread runtime
//! (or inside a `LocalSet`): the queue is `!Send` by construction.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::{TimerQueue, TimerService};

/// tokio instant that corresponds to logical time zero.
fn origin_of(queue: &TimerQueue) -> Instant {
    let now = Instant::now();
    now.checked_sub(Duration::from_millis(queue.now_ms()))
        .unwrap_or(now)
}

fn elapsed_ms(origin: Instant) -> u64 {
    u64::try_from(origin.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Drive `queue` for `duration` of wall time, firing callbacks as they fall
/// due.  Returns the number of callbacks fired.
///
/// On return the logical clock has advanced by exactly `duration`.
pub async fn run_for(queue: &TimerQueue, duration: Duration) -> usize {
    let origin = origin_of(queue);
    let window_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    let end_ms = queue.now_ms().saturating_add(window_ms);
    let mut fired = 0usize;

    debug!(from_ms = queue.now_ms(), end_ms, "timer driver started");

    loop {
        let target_ms = match queue.next_deadline() {
            Some(deadline) if deadline < end_ms => deadline,
            _ => end_ms,
        };

        tokio::select! {
            _ = sleep_until(origin + Duration::from_millis(target_ms)) => {}
            // a timer was added or removed while sleeping: re-plan
            _ = queue.changed() => continue,
        }

        let reached_ms = elapsed_ms(origin).min(end_ms).max(target_ms);
        fired += queue.advance_to(reached_ms);

        if reached_ms >= end_ms {
            break;
        }
    }

    debug!(fired, now_ms = queue.now_ms(), "timer driver finished");
    fired
}

/// Drive `queue` until no timer is pending.
///
/// Never returns while a periodic generator is running; use [`run_for`] or
/// stop the generator from a callback.
pub async fn run_until_idle(queue: &TimerQueue) -> usize {
    let origin = origin_of(queue);
    let mut fired = 0usize;

    while let Some(target_ms) = queue.next_deadline() {
        tokio::select! {
            _ = sleep_until(origin + Duration::from_millis(target_ms)) => {}
            _ = queue.changed() => continue,
        }
        let reached_ms = elapsed_ms(origin).max(target_ms);
        fired += queue.advance_to(reached_ms);
    }

    debug!(fired, now_ms = queue.now_ms(), "timer queue idle");
    fired
}

// ── Tests ─────────────────────────────────────────────────────────────────────
