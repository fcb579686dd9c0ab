/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Deadline bookkeeping for one periodic task.
//!
//! Pure arithmetic over monotonic timestamps, kept apart from the thread
//! loop so drift and overrun behaviour can be checked with synthetic times.
//!
//! ```text
//!   release k          deadline k = release k+1
//!   |── run ──|.. sleep ..|── run ──|.. sleep ..|
//!   |<───── period ──────>|<───── period ──────>|
//!
//! overrun:
//!   |──────── run ────────────|── run ──|.. sleep ..|
//!   |<───── period ──────>|    ^ re-anchored release
//!                         deadline missed
//! ```
//!
//! On time, every deadline is `first_release + k × period` exactly, so wake-up
//! jitter never accumulates.  After an overrun the sequence is re-anchored at
//! the completion time of the late iteration: the next release is "now" and
//! no iterations are replayed to catch up.

use std::time::Duration;

/// What the loop should do after an iteration completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// Deadline met; sleep until the absolute time `until`.
    Sleep { until: Duration },
    /// Deadline missed by `late_by`; start the next iteration immediately.
    Overrun { late_by: Duration },
}

#[derive(Debug, Clone)]
pub struct PeriodicSchedule {
    period: Duration,
    deadline: Duration,
    overruns: u64,
}

impl PeriodicSchedule {
    /// Schedule whose first iteration is released at `first_release`.
    pub fn new(period: Duration, first_release: Duration) -> Self {
        Self {
            period,
            deadline: first_release + period,
            overruns: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Deadline of the iteration currently in flight.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Overruns seen so far.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Record that the current iteration finished at `now` and advance to the
    /// next one.  Finishing exactly at the deadline leaves no time to sleep
    /// and counts as a miss.
    pub fn complete(&mut self, now: Duration) -> Wakeup {
        if now < self.deadline {
            let until = self.deadline;
            self.deadline += self.period;
            Wakeup::Sleep { until }
        } else {
            let late_by = now - self.deadline;
            self.overruns += 1;
            self.deadline = now + self.period;
            Wakeup::Overrun { late_by }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
