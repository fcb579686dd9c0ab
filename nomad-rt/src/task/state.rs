/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! State shared between a [`TaskNode`](super::TaskNode), its thread and the
//! [`TaskManager`](crate::manager::TaskManager) registry.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use super::params::TaskConfig;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Process-unique task identity, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Lifecycle of a task node.
///
/// ```text
/// Idle ──start()──► Started ──setup ok──► Running ──stop()──► Stopped
///                      │                                        │
///                      └──────── start error ──► Failed          └─► start() again
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Idle = 0,
    Started = 1,
    Running = 2,
    Stopped = 3,
    Failed = 4,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TaskState::Started,
            2 => TaskState::Running,
            3 => TaskState::Stopped,
            4 => TaskState::Failed,
            _ => TaskState::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Started => "started",
            TaskState::Running => "running",
            TaskState::Stopped => "stopped",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Execution statistics ──────────────────────────────────────────────────────

/// Execution time of `run()` over all iterations so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecStats {
    pub samples: u64,
    pub last: Duration,
    pub min: Duration,
    pub max: Duration,
    total: Duration,
}

impl ExecStats {
    pub fn record(&mut self, elapsed: Duration) {
        if self.samples == 0 || elapsed < self.min {
            self.min = elapsed;
        }
        if elapsed > self.max {
            self.max = elapsed;
        }
        self.last = elapsed;
        self.total += elapsed;
        self.samples += 1;
    }

    pub fn mean(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total.div_f64(self.samples as f64)
        }
    }
}

// ── Shared block ──────────────────────────────────────────────────────────────

/// Everything that outlives a single run of the task thread.
///
/// The node owns it through an `Arc`; the registry only keeps a `Weak`.
#[derive(Debug)]
pub(crate) struct TaskShared {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) config: RwLock<TaskConfig>,
    state: AtomicU8,
    cancel: AtomicBool,
    cancel_requests: AtomicU64,
    iterations: AtomicU64,
    missed: AtomicU64,
    run_errors: AtomicU64,
    exec: Mutex<ExecStats>,
    exited: Mutex<bool>,
    exited_cv: Condvar,
}

impl TaskShared {
    pub(crate) fn new(name: String, config: TaskConfig) -> Self {
        Self {
            id: TaskId::next(),
            name,
            config: RwLock::new(config),
            state: AtomicU8::new(TaskState::Idle as u8),
            cancel: AtomicBool::new(false),
            cancel_requests: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            missed: AtomicU64::new(0),
            run_errors: AtomicU64::new(0),
            exec: Mutex::new(ExecStats::default()),
            exited: Mutex::new(true),
            exited_cv: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    /// Raise the cancellation flag.  Returns `true` only for the call that
    /// actually raised it.
    pub(crate) fn request_cancel(&self) -> bool {
        let first = !self.cancel.swap(true, Ordering::AcqRel);
        if first {
            self.cancel_requests.fetch_add(1, Ordering::Relaxed);
        }
        first
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub(crate) fn cancel_requests(&self) -> u64 {
        self.cancel_requests.load(Ordering::Relaxed)
    }

    /// Prepare for a new thread: clear the flag and mark the thread alive.
    pub(crate) fn arm(&self) {
        self.cancel.store(false, Ordering::Release);
        *self.exited.lock() = false;
    }

    // ── Thread exit ───────────────────────────────────────────────────────────

    pub(crate) fn mark_exited(&self) {
        *self.exited.lock() = true;
        self.exited_cv.notify_all();
    }

    /// Wait up to `timeout` for the thread to exit.  Returns `true` if it did.
    pub(crate) fn wait_exited(&self, timeout: Duration) -> bool {
        let mut exited = self.exited.lock();
        if !*exited {
            self.exited_cv.wait_while_for(&mut exited, |e| !*e, timeout);
        }
        *exited
    }

    // ── Counters ──────────────────────────────────────────────────────────────

    /// Account for one completed iteration.
    pub(crate) fn record_iteration(&self, elapsed: Duration, missed: bool) {
        self.exec.lock().record(elapsed);
        if missed {
            self.missed.fetch_add(1, Ordering::Relaxed);
        }
        self.iterations.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn record_run_error(&self) -> u64 {
        self.run_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Acquire)
    }

    pub(crate) fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    pub(crate) fn run_errors(&self) -> u64 {
        self.run_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn exec_stats(&self) -> ExecStats {
        *self.exec.lock()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique_and_increasing() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b > a);
    }

    #[test]
    fn exec_stats_track_min_max_mean() {
        let mut s = ExecStats::default();
        for us in [300, 100, 200] {
            s.record(Duration::from_micros(us));
        }
        assert_eq!(s.samples, 3);
        assert_eq!(s.min, Duration::from_micros(100));
        assert_eq!(s.max, Duration::from_micros(300));
        assert_eq!(s.last, Duration::from_micros(200));
        assert_eq!(s.mean(), Duration::from_micros(200));
    }

    #[test]
    fn cancellation_is_requested_once() {
        let shared = TaskShared::new("t".into(), TaskConfig::default());
        assert!(shared.request_cancel());
        assert!(!shared.request_cancel());
        assert_eq!(shared.cancel_requests(), 1);

        shared.arm();
        assert!(!shared.cancel_requested());
        assert!(shared.request_cancel());
        assert_eq!(shared.cancel_requests(), 2);
    }

    #[test]
    fn wait_exited_times_out_while_armed() {
        let shared = TaskShared::new("t".into(), TaskConfig::default());
        assert!(shared.wait_exited(Duration::ZERO));
        shared.arm();
        assert!(!shared.wait_exited(Duration::from_millis(5)));
        shared.mark_exited();
        assert!(shared.wait_exited(Duration::ZERO));
    }

    #[test]
    fn missed_deadlines_are_monotonic() {
        let shared = TaskShared::new("t".into(), TaskConfig::default());
        shared.record_iteration(Duration::from_micros(5), true);
        shared.record_iteration(Duration::from_micros(5), false);
        shared.record_iteration(Duration::from_micros(5), true);
        assert_eq!(shared.iterations(), 3);
        assert_eq!(shared.missed(), 2);
    }
}
