/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Monotonic time source for the periodic loop.
//!
//! Timestamps are `Duration`s since the `CLOCK_MONOTONIC` epoch so that the
//! deadline arithmetic in [`PeriodicSchedule`](super::schedule::PeriodicSchedule)
//! stays free of OS types.  On Linux [`sleep_until`] uses an absolute-time
//! `clock_nanosleep`, so a late wake-up never shifts later deadlines.

use std::time::Duration;

#[cfg(target_os = "linux")]
mod imp {
    use std::time::Duration;

    pub fn now() -> Duration {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid out-pointer; CLOCK_MONOTONIC always exists.
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
    }

    pub fn sleep_until(deadline: Duration) {
        let ts = libc::timespec {
            tv_sec: deadline.as_secs() as libc::time_t,
            tv_nsec: deadline.subsec_nanos() as libc::c_long,
        };
        loop {
            // SAFETY: `ts` is valid for the duration of the call; the
            // remainder pointer is unused with TIMER_ABSTIME.
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &ts,
                    std::ptr::null_mut(),
                )
            };
            // Restart after a signal; the absolute deadline is unchanged.
            if rc != libc::EINTR {
                break;
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::time::{Duration, Instant};

    use once_cell::sync::OnceCell;

    fn epoch() -> Instant {
        static EPOCH: OnceCell<Instant> = OnceCell::new();
        *EPOCH.get_or_init(Instant::now)
    }

    pub fn now() -> Duration {
        epoch().elapsed()
    }

    pub fn sleep_until(deadline: Duration) {
        let now = now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Current monotonic time.
pub fn now() -> Duration {
    imp::now()
}

/// Block the calling thread until the monotonic clock reaches `deadline`.
/// Returns immediately if the deadline has already passed.
pub fn sleep_until(deadline: Duration) {
    imp::sleep_until(deadline)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }

    #[test]
    fn sleep_until_reaches_deadline() {
        let deadline = now() + Duration::from_millis(5);
        sleep_until(deadline);
        assert!(now() >= deadline);
    }

    #[test]
    fn past_deadline_returns_immediately() {
        let start = now();
        sleep_until(start.saturating_sub(Duration::from_millis(50)));
        assert!(now() - start < Duration::from_millis(50));
    }
}
