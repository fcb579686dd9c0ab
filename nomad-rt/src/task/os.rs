/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Thread attributes applied from inside a freshly spawned task thread.
//!
//! Policy and priority are set on `pthread_self()` rather than inherited
//! from the spawning thread, so every task gets exactly what its
//! [`TaskConfig`](super::TaskConfig) asks for.

use std::io;

use tracing::debug;

use super::params::{Priority, SchedPolicy};

/// Failure applying the scheduling class.
#[derive(Debug)]
pub(crate) enum PolicyFailure {
    /// The OS refused the call (`EPERM` without `CAP_SYS_NICE`, ...).
    Os(io::Error),
    /// The priority lies outside the policy's OS range.
    Priority { priority: i32, min: i32, max: i32 },
}

/// Smallest stack the platform accepts for a new thread.
pub fn min_stack_size() -> usize {
    #[cfg(target_os = "linux")]
    {
        libc::PTHREAD_STACK_MIN
    }
    #[cfg(not(target_os = "linux"))]
    {
        16 * 1024
    }
}

/// Number of logical CPUs.
pub fn cpu_count() -> usize {
    num_cpus::get()
}

/// Kernel thread id of the calling thread (0 where unsupported).
pub fn current_tid() -> i64 {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: gettid has no preconditions.
        unsafe { libc::syscall(libc::SYS_gettid) as i64 }
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// OS priority value for `policy`.  `SCHED_OTHER` only accepts 0.
pub(crate) fn os_priority(policy: SchedPolicy, priority: Priority) -> i32 {
    if policy.is_realtime() {
        priority.to_os_priority()
    } else {
        0
    }
}

/// Apply `policy` / `priority` to the calling thread.
#[cfg(unix)]
pub(crate) fn apply_sched_policy(
    policy: SchedPolicy,
    priority: Priority,
) -> Result<i32, PolicyFailure> {
    let os_policy = policy.to_linux_int();
    let os_prio = os_priority(policy, priority);

    // SAFETY: plain queries on a valid policy constant.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(os_policy),
            libc::sched_get_priority_max(os_policy),
        )
    };
    if min < 0 || max < 0 {
        return Err(PolicyFailure::Os(io::Error::last_os_error()));
    }
    if os_prio < min || os_prio > max {
        return Err(PolicyFailure::Priority {
            priority: os_prio,
            min,
            max,
        });
    }

    let param = libc::sched_param {
        sched_priority: os_prio,
    };
    // SAFETY: pthread_self() is always valid for the calling thread and
    // `param` outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), os_policy, &param) };
    match rc {
        0 => {
            debug!(policy = %policy, os_priority = os_prio, "scheduling policy applied");
            Ok(os_prio)
        }
        libc::EINVAL => Err(PolicyFailure::Priority {
            priority: os_prio,
            min,
            max,
        }),
        errno => Err(PolicyFailure::Os(io::Error::from_raw_os_error(errno))),
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_sched_policy(
    policy: SchedPolicy,
    priority: Priority,
) -> Result<i32, PolicyFailure> {
    if policy.is_realtime() {
        return Err(PolicyFailure::Os(io::Error::new(
            io::ErrorKind::Unsupported,
            "real-time scheduling is not supported on this platform",
        )));
    }
    Ok(os_priority(policy, priority))
}

/// Pin the calling thread to logical core `core`.  Returns `false` when the
/// core is unknown to the OS or the call failed.
pub(crate) fn pin_current_thread(core: usize) -> bool {
    let Some(ids) = core_affinity::get_core_ids() else {
        return false;
    };
    match ids.into_iter().find(|c| c.id == core) {
        Some(id) => core_affinity::set_for_current(id),
        None => false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
