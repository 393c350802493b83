//! Deadline arithmetic for the search budgets.

use std::time::{Duration, Instant};

/// `millis` after `start`; no deadline when `millis` is 0.
pub(crate) fn deadline_from_millis(start: Instant, millis: u64) -> Option<Instant> {
    if millis == 0 {
        None
    } else {
        start.checked_add(Duration::from_millis(millis))
    }
}

/// Earliest of several optional deadlines.
pub(crate) fn earliest(deadlines: &[Option<Instant>]) -> Option<Instant> {
    deadlines.iter().flatten().min().copied()
}

/// Milliseconds left before `deadline`, at least 1 while it lies in the future.
pub(crate) fn remaining_timeout_ms(deadline: Option<Instant>) -> Option<u64> {
    let deadline = deadline?;
    let now = Instant::now();
    if now >= deadline {
        return Some(0);
    }
    let remaining = deadline.saturating_duration_since(now);
    Some((remaining.as_millis() as u64).max(1))
}
