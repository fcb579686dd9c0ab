/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task registry.
//!
//! The [`TaskManager`] knows every live [`TaskNode`] of the process, the
//! number of logical CPUs and the transport [`Context`] all ports share.  It
//! observes and can cancel tasks but never drives the data flow.
//!
//! Prefer an explicitly constructed registry passed around by `Arc`;
//! [`TaskManager::instance`] exists for code that needs one process-wide
//! registry without plumbing.
//!
//! The registry holds `Weak` references only: dropping a node removes it,
//! and a dead entry can never keep a task alive.

pub mod feasibility;

use std::sync::{Arc, Weak};
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::port::Context;
use crate::task::state::TaskShared;
use crate::task::{
    os, CpuAffinity, ExecStats, Priority, SchedPolicy, TaskId, TaskNode, TaskState,
};
use feasibility::CoreUtilization;

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Point-in-time view of one registered task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub period: Duration,
    pub priority: Priority,
    pub policy: SchedPolicy,
    pub affinity: CpuAffinity,
    pub state: TaskState,
    pub iterations: u64,
    pub missed_deadlines: u64,
    pub run_errors: u64,
    pub exec: ExecStats,
}

impl TaskSnapshot {
    fn of(shared: &TaskShared) -> Self {
        let config = shared.config.read().clone();
        Self {
            id: shared.id,
            name: shared.name.clone(),
            period: config.period,
            priority: config.priority,
            policy: config.policy,
            affinity: config.affinity,
            state: shared.state(),
            iterations: shared.iterations(),
            missed_deadlines: shared.missed(),
            run_errors: shared.run_errors(),
            exec: shared.exec_stats(),
        }
    }
}

// ── TaskManager ───────────────────────────────────────────────────────────────

struct Entry {
    id: TaskId,
    task: Weak<TaskShared>,
}

pub struct TaskManager {
    tasks: Mutex<Vec<Entry>>,
    cpu_count: usize,
    context: Arc<Context>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("tasks", &self.tasks.lock().len())
            .field("cpu_count", &self.cpu_count)
            .finish()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    /// Registry sized to the machine's logical CPU count.
    pub fn new() -> Self {
        Self::with_cpu_count(os::cpu_count())
    }

    /// Registry with an explicit CPU count (affinity indices `>= cpu_count`
    /// are reported out of range).
    pub fn with_cpu_count(cpu_count: usize) -> Self {
        info!(cpu_count, "task manager created");
        Self {
            tasks: Mutex::new(Vec::new()),
            cpu_count,
            context: Arc::new(Context::new()),
        }
    }

    /// The process-wide registry, created on first use.
    pub fn instance() -> Arc<TaskManager> {
        static INSTANCE: OnceCell<Arc<TaskManager>> = OnceCell::new();
        Arc::clone(INSTANCE.get_or_init(|| Arc::new(TaskManager::new())))
    }

    pub fn get_cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// Transport context shared by the ports of every task in this registry.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Number of live registered tasks.
    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|e| e.task.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Register `task`.  Returns `false` if it is already registered.
    ///
    /// Nodes register themselves on creation, so calling this directly is
    /// only needed after [`end_task`](Self::end_task).
    pub fn add_task(&self, task: &TaskNode) -> bool {
        let mut tasks = self.tasks.lock();
        tasks.retain(|e| e.task.strong_count() > 0);

        if tasks.iter().any(|e| e.id == task.id()) {
            warn!(task = %task.name(), id = %task.id(), "task already registered");
            return false;
        }
        tasks.push(Entry {
            id: task.id(),
            task: Arc::downgrade(task.shared()),
        });
        info!(task = %task.name(), id = %task.id(), registered = tasks.len(), "task registered");
        true
    }

    /// Request cancellation of `task` and remove it from the registry.
    /// Returns `false` if it was not registered.
    pub fn end_task(&self, task: &TaskNode) -> bool {
        if self.remove_where(|e| e.id == task.id()).is_none() {
            warn!(task = %task.name(), "end_task: task is not registered");
            return false;
        }
        self.cancel(task.shared());
        true
    }

    /// [`end_task`](Self::end_task) by name.  Ends the first live task with
    /// that name.
    pub fn end_task_by_name(&self, name: &str) -> bool {
        let removed = self
            .remove_where(|e| e.task.upgrade().is_some_and(|t| t.name == name))
            .and_then(|e| e.task.upgrade());
        match removed {
            Some(shared) => {
                self.cancel(&shared);
                true
            }
            None => {
                warn!(task = %name, "end_task_by_name: no such task");
                false
            }
        }
    }

    /// Drop the registry entry of a node that is going away.
    pub(crate) fn deregister(&self, id: TaskId) {
        if self.remove_where(|e| e.id == id).is_some() {
            debug!(id = %id, "task deregistered");
        }
    }

    fn remove_where(&self, pred: impl Fn(&Entry) -> bool) -> Option<Entry> {
        let mut tasks = self.tasks.lock();
        let pos = tasks.iter().position(pred)?;
        Some(tasks.remove(pos))
    }

    fn cancel(&self, task: &TaskShared) {
        if task.request_cancel() {
            info!(task = %task.name, "task cancellation requested");
        }
        info!(task = %task.name, "task removed from registry");
    }

    // ── Diagnostics ───────────────────────────────────────────────────────────

    /// Snapshot of every live task in registration order.
    pub fn active_tasks(&self) -> Vec<TaskSnapshot> {
        self.tasks
            .lock()
            .iter()
            .filter_map(|e| e.task.upgrade())
            .map(|t| TaskSnapshot::of(&t))
            .collect()
    }

    /// Measured per-core utilisation with the Liu & Layland check.
    pub fn utilization_report(&self) -> Vec<CoreUtilization> {
        feasibility::utilization_by_core(&self.active_tasks())
    }

    /// Log every live task and warn for each core over its schedulability
    /// bound.
    pub fn print_active_tasks(&self) {
        let tasks = self.active_tasks();
        info!(count = tasks.len(), cpu_count = self.cpu_count, "active tasks");
        for t in &tasks {
            info!(
                task = %t.name,
                id = %t.id,
                state = %t.state,
                period_us = t.period.as_micros() as u64,
                priority = %t.priority,
                policy = %t.policy,
                affinity = %t.affinity,
                iterations = t.iterations,
                missed_deadlines = t.missed_deadlines,
                run_errors = t.run_errors,
                exec_mean_us = t.exec.mean().as_micros() as u64,
                exec_max_us = t.exec.max.as_micros() as u64,
                "task status"
            );
        }
        for core in feasibility::utilization_by_core(&tasks) {
            if core.exceeds_bound() {
                warn!(
                    core = ?core.core,
                    utilization = core.utilization,
                    bound = core.bound.unwrap_or_default(),
                    tasks = ?core.tasks,
                    "core utilisation exceeds Liu & Layland bound"
                );
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
