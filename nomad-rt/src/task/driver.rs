/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Body of a task thread: bring-up, start handshake, periodic loop, teardown.
//!
//! ```text
//! spawn ─► apply policy/priority ─► pin core ─► Task::setup ─► handshake
//!                                                                 │
//!     ┌───────────────────────────────────────────────────────────┘
//!     ▼
//!   cancel? ──yes──► Task::shutdown ─► return (body, ports)
//!     │no
//!     ▼
//!   run() ─► record exec time ─► sleep to absolute deadline | count overrun
//!     └──────────────────────────────────────────────────────────┘
//! ```

use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::clock;
use super::os::{self, PolicyFailure};
use super::params::{CpuAffinity, TaskConfig};
use super::schedule::{PeriodicSchedule, Wakeup};
use super::state::{TaskShared, TaskState};
use super::{AffinityOutcome, StartReport, Task};
use crate::error::StartError;
use crate::port::Ports;

/// Repeated `run()` failures are logged on the first occurrence and then
/// once every this many.
const RUN_ERROR_LOG_EVERY: u64 = 1000;

/// What the thread hands back when it exits.
pub(super) type Recovered = (Box<dyn Task>, Ports);

/// Everything a task thread needs, moved into it at spawn.
pub(super) struct Launch {
    pub shared: Arc<TaskShared>,
    pub config: TaskConfig,
    pub cpu_count: usize,
    pub body: Box<dyn Task>,
    pub ports: Ports,
    pub ready: SyncSender<Result<StartReport, StartError>>,
}

/// Marks the thread as exited on every path out of [`run`], unwinding
/// included.
struct ExitGuard(Arc<TaskShared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.mark_exited();
    }
}

/// Thread entry point.
pub(super) fn run(launch: Launch) -> Recovered {
    let Launch {
        shared,
        config,
        cpu_count,
        mut body,
        mut ports,
        ready,
    } = launch;
    let _exit = ExitGuard(Arc::clone(&shared));

    match bring_up(&shared.name, &config, cpu_count, body.as_mut(), &mut ports) {
        Ok(report) => {
            shared.set_state(TaskState::Running);
            info!(
                task = %shared.name,
                tid = report.tid,
                policy = %config.policy,
                os_priority = report.os_priority,
                affinity = ?report.affinity,
                period_us = config.period.as_micros() as u64,
                "task running"
            );
            // The receiver only disappears if start() itself unwound.
            let _ = ready.send(Ok(report));
        }
        Err(e) => {
            shared.set_state(TaskState::Failed);
            // Setup may have opened some ports before failing.
            ports.close_all();
            let _ = ready.send(Err(e));
            return (body, ports);
        }
    }

    periodic_loop(&shared, config.period, body.as_mut(), &mut ports);

    body.shutdown(&mut ports);
    ports.close_all();
    shared.set_state(TaskState::Stopped);
    info!(
        task = %shared.name,
        iterations = shared.iterations(),
        missed_deadlines = shared.missed(),
        "task stopped"
    );
    (body, ports)
}

fn bring_up(
    name: &str,
    config: &TaskConfig,
    cpu_count: usize,
    body: &mut dyn Task,
    ports: &mut Ports,
) -> Result<StartReport, StartError> {
    let policy = config.policy;
    let os_priority = os::apply_sched_policy(policy, config.priority).map_err(|f| match f {
        PolicyFailure::Os(source) => StartError::Policy {
            task: name.to_string(),
            policy: policy.as_str(),
            source,
        },
        PolicyFailure::Priority { priority, min, max } => StartError::Priority {
            task: name.to_string(),
            priority,
            policy: policy.as_str(),
            min,
            max,
        },
    })?;

    let affinity = match config.affinity {
        CpuAffinity::Any => AffinityOutcome::Unpinned,
        CpuAffinity::Core(core) if core >= cpu_count => {
            warn!(
                task = %name,
                core,
                cpu_count,
                "affinity core out of range, running unpinned"
            );
            AffinityOutcome::OutOfRange {
                requested: core,
                cpu_count,
            }
        }
        CpuAffinity::Core(core) => {
            if !os::pin_current_thread(core) {
                return Err(StartError::Affinity {
                    task: name.to_string(),
                    core,
                });
            }
            debug!(task = %name, core, "thread pinned");
            AffinityOutcome::Pinned(core)
        }
    };

    body.setup(ports).map_err(|source| StartError::Setup {
        task: name.to_string(),
        source,
    })?;

    Ok(StartReport {
        pid: std::process::id(),
        tid: os::current_tid(),
        policy,
        os_priority,
        affinity,
    })
}

fn periodic_loop(shared: &TaskShared, period: Duration, body: &mut dyn Task, ports: &mut Ports) {
    let mut schedule = PeriodicSchedule::new(period, clock::now());

    while !shared.cancel_requested() {
        let started = clock::now();
        if let Err(e) = body.run(ports) {
            let n = shared.record_run_error();
            if n == 1 || n % RUN_ERROR_LOG_EVERY == 0 {
                warn!(task = %shared.name, errors = n, "run() failed: {e:#}");
            }
        }
        let finished = clock::now();
        let elapsed = finished.saturating_sub(started);

        match schedule.complete(finished) {
            Wakeup::Sleep { until } => {
                shared.record_iteration(elapsed, false);
                clock::sleep_until(until);
            }
            Wakeup::Overrun { late_by } => {
                shared.record_iteration(elapsed, true);
                debug!(
                    task = %shared.name,
                    late_by_us = late_by.as_micros() as u64,
                    missed_deadlines = shared.missed(),
                    "deadline overrun"
                );
            }
        }
    }
}
