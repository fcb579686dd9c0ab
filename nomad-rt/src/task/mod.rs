/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Periodic real-time task nodes.
//!
//! A [`TaskNode`] owns a [`Task`] body, its [`Ports`] and the scheduling
//! parameters of one OS thread.  `start()` moves body and ports onto a new
//! thread which applies its policy, priority and core affinity, runs
//! `Task::setup` once and then calls `Task::run` once per period until
//! `stop()` is requested.  `stop()` hands body and ports back, so a node can
//! be started again.
//!
//! ```text
//!           ┌──────── TaskNode (caller thread) ────────┐
//!           │ Arc<TaskShared>  config / counters / flag │◄── Weak ── TaskManager
//!           │ Option<Box<dyn Task>>, Option<Ports>      │
//!           └──────────────┬────────────────▲───────────┘
//!                   start()│ move           │ join (stop)
//!                          ▼                │
//!           ┌──────── task thread ──────────┴──────────┐
//!           │ setup → [run → sleep_until(deadline)]*   │
//!           └──────────────────────────────────────────┘
//! ```

pub mod clock;
mod driver;
pub mod os;
pub mod params;
pub mod schedule;
pub mod state;

pub use params::{CpuAffinity, Priority, SchedPolicy, TaskConfig};
pub use state::{ExecStats, TaskId, TaskState};

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context as _;
use tracing::{debug, error, info, warn};

use crate::config::TaskSettings;
use crate::error::{ConfigError, PortError, StartError};
use crate::manager::TaskManager;
use crate::port::{DataType, Port, PortSpec, Ports};
use driver::{Launch, Recovered};
use state::TaskShared;

// ── Task body ─────────────────────────────────────────────────────────────────

/// The work a task node performs.
///
/// All three hooks run on the task thread.  `setup` runs once after the
/// thread attributes are applied; an error aborts `start()` with
/// [`StartError::Setup`].  `run` runs once per period; an error is logged
/// and counted and the loop goes on.  `shutdown` runs once after the
/// cancellation request is observed.
pub trait Task: Send + 'static {
    /// Open the ports.  The default binds every output and connects every
    /// input to its configured transport address.
    fn setup(&mut self, ports: &mut Ports) -> anyhow::Result<()> {
        ports.bind_all()?;
        ports.connect_all()?;
        Ok(())
    }

    fn run(&mut self, ports: &mut Ports) -> anyhow::Result<()>;

    fn shutdown(&mut self, _ports: &mut Ports) {}
}

impl<F> Task for F
where
    F: FnMut(&mut Ports) -> anyhow::Result<()> + Send + 'static,
{
    fn run(&mut self, ports: &mut Ports) -> anyhow::Result<()> {
        self(ports)
    }
}

// ── Start / stop results ──────────────────────────────────────────────────────

/// Result of applying the configured core affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityOutcome {
    /// No affinity was configured.
    Unpinned,
    /// Thread pinned to this core.
    Pinned(usize),
    /// Requested core does not exist; the thread runs unpinned.
    OutOfRange { requested: usize, cpu_count: usize },
}

/// Reported by a task thread once it has entered its periodic loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub pid: u32,
    /// Kernel thread id (0 where unsupported).
    pub tid: i64,
    pub policy: SchedPolicy,
    /// `sched_priority` actually applied.
    pub os_priority: i32,
    pub affinity: AffinityOutcome,
}

/// Result of [`TaskNode::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Thread left its loop and was joined; the node can be restarted.
    Stopped,
    /// Nothing was running.
    NotRunning,
    /// Grace period expired.  The thread was detached and exits at its next
    /// period boundary; the body is lost.
    Detached,
    /// The task body panicked; the body is lost.
    Panicked,
}

// ── TaskNode ──────────────────────────────────────────────────────────────────

pub struct TaskNode {
    shared: Arc<TaskShared>,
    manager: Arc<TaskManager>,
    body: Option<Box<dyn Task>>,
    ports: Option<Ports>,
    thread: Option<JoinHandle<Recovered>>,
    stop_grace: Duration,
    last_report: Option<StartReport>,
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl TaskNode {
    /// Create a node with default parameters and register it with `manager`.
    pub fn new(manager: &Arc<TaskManager>, name: impl Into<String>, body: impl Task) -> Self {
        Self::with_config(manager, name, TaskConfig::default(), body)
    }

    pub fn with_config(
        manager: &Arc<TaskManager>,
        name: impl Into<String>,
        config: TaskConfig,
        body: impl Task,
    ) -> Self {
        let node = Self {
            shared: Arc::new(TaskShared::new(name.into(), config)),
            manager: Arc::clone(manager),
            body: Some(Box::new(body)),
            ports: Some(Ports::new(Arc::clone(manager.context()))),
            thread: None,
            stop_grace: Duration::ZERO,
            last_report: None,
        };
        manager.add_task(&node);
        node
    }

    pub(crate) fn shared(&self) -> &Arc<TaskShared> {
        &self.shared
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> TaskConfig {
        self.shared.config.read().clone()
    }

    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    /// `true` while the task thread is alive.  A thread that left its loop on
    /// its own (for example after `TaskManager::end_task`) is not running.
    pub fn is_running(&self) -> bool {
        self.thread.is_some() && !self.shared.wait_exited(Duration::ZERO)
    }

    /// Monotonically increasing count of missed deadlines.
    pub fn missed_deadlines(&self) -> u64 {
        self.shared.missed()
    }

    pub fn iterations(&self) -> u64 {
        self.shared.iterations()
    }

    pub fn run_errors(&self) -> u64 {
        self.shared.run_errors()
    }

    pub fn exec_stats(&self) -> ExecStats {
        self.shared.exec_stats()
    }

    /// How many times cancellation has been requested over the node's life.
    pub fn cancel_requests(&self) -> u64 {
        self.shared.cancel_requests()
    }

    /// Report of the most recent successful start.
    pub fn last_start_report(&self) -> Option<&StartReport> {
        self.last_report.as_ref()
    }

    // ── Scheduling parameters ─────────────────────────────────────────────────
    //
    // Changes take effect at the next start().

    pub fn set_task_period(&mut self, period: Duration) -> Result<(), ConfigError> {
        let period = TaskConfig::check_period(period)?;
        self.update(|c| c.period = period);
        Ok(())
    }

    pub fn set_task_frequency(&mut self, hz: f64) -> Result<(), ConfigError> {
        let period = TaskConfig::period_from_frequency(hz)?;
        self.update(|c| c.period = period);
        Ok(())
    }

    pub fn set_task_priority(&mut self, priority: Priority) {
        self.update(|c| c.priority = priority);
    }

    pub fn set_policy(&mut self, policy: SchedPolicy) {
        self.update(|c| c.policy = policy);
    }

    pub fn set_core_affinity(&mut self, affinity: CpuAffinity) {
        self.update(|c| c.affinity = affinity);
    }

    pub fn set_stack_size(&mut self, bytes: usize) -> Result<(), ConfigError> {
        let bytes = TaskConfig::check_stack_size(bytes)?;
        self.update(|c| c.stack_size = bytes);
        Ok(())
    }

    pub fn set_stop_grace(&mut self, grace: Duration) {
        self.update(|c| c.stop_grace = Some(grace));
    }

    fn update(&mut self, f: impl FnOnce(&mut TaskConfig)) {
        f(&mut *self.shared.config.write());
        if self.is_running() {
            debug!(task = %self.name(), "parameter change applies at next start");
        }
    }

    /// Apply a configuration file entry: scheduling parameters plus the
    /// transport address of every listed port.
    pub fn apply_settings(&mut self, settings: &TaskSettings) -> anyhow::Result<()> {
        let task = self.name().to_string();
        let config = settings
            .to_task_config(&self.config())
            .with_context(|| format!("invalid settings for task '{task}'"))?;
        *self.shared.config.write() = config;

        for (port, address) in &settings.inputs {
            self.input_port_mut(port)
                .with_context(|| format!("task '{task}': cannot wire input"))?
                .set_transport(address.clone());
        }
        for (port, address) in &settings.outputs {
            self.output_port_mut(port)
                .with_context(|| format!("task '{task}': cannot wire output"))?
                .set_transport(address.clone());
        }
        debug!(task = %task, "settings applied");
        Ok(())
    }

    // ── Ports ─────────────────────────────────────────────────────────────────

    fn ports_mut(&mut self) -> Result<&mut Ports, PortError> {
        self.reap();
        let task = &self.shared.name;
        self.ports
            .as_mut()
            .ok_or_else(|| PortError::TaskRunning { task: task.clone() })
    }

    fn ports_ref(&self) -> Result<&Ports, PortError> {
        self.ports.as_ref().ok_or_else(|| PortError::TaskRunning {
            task: self.shared.name.clone(),
        })
    }

    pub fn add_input_port(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        count: usize,
    ) -> Result<&mut Port, PortError> {
        self.add_port(PortSpec::input(name, data_type, count))
    }

    pub fn add_output_port(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        count: usize,
    ) -> Result<&mut Port, PortError> {
        self.add_port(PortSpec::output(name, data_type, count))
    }

    /// Declare a port from a full spec (period, transport, ...).
    pub fn add_port(&mut self, spec: PortSpec) -> Result<&mut Port, PortError> {
        self.ports_mut()?.add(spec)
    }

    pub fn input_port(&self, name: &str) -> Result<&Port, PortError> {
        self.ports_ref()?.get_input(name)
    }

    pub fn output_port(&self, name: &str) -> Result<&Port, PortError> {
        self.ports_ref()?.get_output(name)
    }

    pub fn input_port_mut(&mut self, name: &str) -> Result<&mut Port, PortError> {
        self.ports_mut()?.input(name)
    }

    pub fn output_port_mut(&mut self, name: &str) -> Result<&mut Port, PortError> {
        self.ports_mut()?.output(name)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Spawn the task thread and wait until it has applied its attributes and
    /// completed `setup`.
    pub fn start(&mut self) -> Result<StartReport, StartError> {
        let task = self.shared.name.clone();
        self.reap();
        if self.thread.is_some() {
            return Err(StartError::AlreadyRunning { task });
        }

        let config = self.config();
        let minimum = os::min_stack_size();
        if config.stack_size < minimum {
            return Err(StartError::StackSize {
                task,
                requested: config.stack_size,
                minimum,
            });
        }

        let (body, ports) = match (self.body.take(), self.ports.take()) {
            (Some(body), Some(ports)) => (body, ports),
            (body, ports) => {
                self.body = body;
                self.ports = ports;
                return Err(StartError::BodyUnavailable { task });
            }
        };

        self.shared.arm();
        self.shared.set_state(TaskState::Started);
        self.stop_grace = config.effective_stop_grace();

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let launch = Launch {
            shared: Arc::clone(&self.shared),
            config: config.clone(),
            cpu_count: self.manager.get_cpu_count(),
            body,
            ports,
            ready: ready_tx,
        };

        let spawned = thread::Builder::new()
            .name(task.clone())
            .stack_size(config.stack_size)
            .spawn(move || driver::run(launch));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                // The closure, and the body with it, is gone.
                self.shared.set_state(TaskState::Failed);
                self.shared.mark_exited();
                error!(task = %task, "failed to create task thread: {source}");
                return Err(StartError::Spawn { task, source });
            }
        };

        match ready_rx.recv() {
            Ok(Ok(report)) => {
                info!(
                    task = %task,
                    pid = report.pid,
                    tid = report.tid,
                    "task started"
                );
                self.thread = Some(handle);
                self.last_report = Some(report.clone());
                Ok(report)
            }
            Ok(Err(e)) => {
                error!(task = %task, code = e.code(), "task failed to start: {e}");
                self.recover(handle);
                self.shared.set_state(TaskState::Failed);
                Err(e)
            }
            Err(_) => {
                self.recover(handle);
                self.shared.set_state(TaskState::Failed);
                Err(StartError::Handshake { task })
            }
        }
    }

    /// Request cancellation and wait up to the stop grace period for the
    /// thread to leave its loop.
    pub fn stop(&mut self) -> StopOutcome {
        let Some(handle) = self.thread.take() else {
            return StopOutcome::NotRunning;
        };
        self.shared.request_cancel();

        if !self.shared.wait_exited(self.stop_grace) {
            warn!(
                task = %self.name(),
                grace_ms = self.stop_grace.as_millis() as u64,
                "task did not stop within grace period, detaching thread"
            );
            drop(handle);
            return StopOutcome::Detached;
        }

        if self.recover(handle) {
            StopOutcome::Stopped
        } else {
            self.shared.set_state(TaskState::Failed);
            StopOutcome::Panicked
        }
    }

    /// Take back body and ports from a thread that already exited on its own.
    fn reap(&mut self) {
        if self.thread.is_none() || !self.shared.wait_exited(Duration::ZERO) {
            return;
        }
        if let Some(handle) = self.thread.take() {
            if !self.recover(handle) {
                self.shared.set_state(TaskState::Failed);
            }
        }
    }

    /// Join a thread that has exited and take back body and ports.
    fn recover(&mut self, handle: JoinHandle<Recovered>) -> bool {
        match handle.join() {
            Ok((body, ports)) => {
                self.body = Some(body);
                self.ports = Some(ports);
                true
            }
            Err(_) => {
                error!(task = %self.name(), "task thread panicked");
                false
            }
        }
    }
}

impl Drop for TaskNode {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
        self.manager.deregister(self.shared.id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn manager() -> Arc<TaskManager> {
        Arc::new(TaskManager::new())
    }

    /// Parameters that never need privileges.
    fn test_config(period: Duration) -> TaskConfig {
        TaskConfig {
            period,
            policy: SchedPolicy::Normal,
            ..Default::default()
        }
    }

    fn idle(_: &mut Ports) -> anyhow::Result<()> {
        Ok(())
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    #[test]
    fn frequency_sets_period() {
        let m = manager();
        let mut node = TaskNode::new(&m, "f", idle);
        node.set_task_frequency(250.0).unwrap();
        assert_eq!(node.config().period, Duration::from_micros(4_000));
        assert!(matches!(
            node.set_task_frequency(0.0),
            Err(ConfigError::InvalidFrequency(_))
        ));
        assert_eq!(node.config().period, Duration::from_micros(4_000));
    }

    #[test]
    fn unknown_port_names_are_errors() {
        let m = manager();
        let mut node = TaskNode::new(&m, "p", idle);
        node.add_input_port("FORCES", DataType::Double, 1).unwrap();
        assert!(node.input_port("FORCES").is_ok());
        assert!(matches!(
            node.input_port("STATE"),
            Err(PortError::NotFound { .. })
        ));
        assert!(matches!(
            node.output_port("FORCES"),
            Err(PortError::NotFound { .. })
        ));
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    struct Counting {
        setups: Arc<AtomicU32>,
        runs: Arc<AtomicU32>,
        shutdowns: Arc<AtomicU32>,
    }

    impl Task for Counting {
        fn setup(&mut self, _: &mut Ports) -> anyhow::Result<()> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn run(&mut self, _: &mut Ports) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn shutdown(&mut self, _: &mut Ports) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn setup_runs_once_and_run_repeats_until_stop() {
        let m = manager();
        let setups = Arc::new(AtomicU32::new(0));
        let runs = Arc::new(AtomicU32::new(0));
        let shutdowns = Arc::new(AtomicU32::new(0));
        let body = Counting {
            setups: Arc::clone(&setups),
            runs: Arc::clone(&runs),
            shutdowns: Arc::clone(&shutdowns),
        };
        let mut node =
            TaskNode::with_config(&m, "counting", test_config(Duration::from_millis(2)), body);

        let report = node.start().unwrap();
        assert_eq!(report.pid, std::process::id());
        assert_eq!(report.affinity, AffinityOutcome::Unpinned);
        assert_eq!(node.state(), TaskState::Running);
        assert!(matches!(
            node.start(),
            Err(StartError::AlreadyRunning { .. })
        ));

        thread::sleep(Duration::from_millis(30));
        assert_eq!(node.stop(), StopOutcome::Stopped);
        assert_eq!(node.state(), TaskState::Stopped);
        assert_eq!(setups.load(Ordering::SeqCst), 1);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        let n = runs.load(Ordering::SeqCst);
        assert!(n >= 2, "expected several periods, got {n}");
        assert_eq!(u64::from(n), node.iterations());
        assert_eq!(node.exec_stats().samples, u64::from(n));
    }

    #[test]
    fn node_restarts_after_stop() {
        let m = manager();
        let mut node = TaskNode::with_config(&m, "restart", test_config(Duration::from_millis(1)), idle);
        node.add_output_port("OUT", DataType::Double, 1)
            .unwrap()
            .set_transport("inproc://node-restart/loop");
        node.add_input_port("IN", DataType::Double, 1)
            .unwrap()
            .set_transport("inproc://node-restart/loop");

        node.start().unwrap();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(node.stop(), StopOutcome::Stopped);
        let first = node.iterations();
        assert!(!node.output_port("OUT").unwrap().is_open());
        assert!(!node.input_port("IN").unwrap().is_open());
        assert!(!m.context().is_bound("node-restart/loop"));

        node.start().unwrap();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(node.stop(), StopOutcome::Stopped);
        assert!(node.iterations() > first);
        assert_eq!(node.stop(), StopOutcome::NotRunning);
    }

    #[test]
    fn stopped_node_releases_its_output_address() {
        let m = manager();
        let mut first = TaskNode::with_config(&m, "first", test_config(Duration::from_millis(1)), idle);
        first
            .add_output_port("OUT", DataType::Double, 1)
            .unwrap()
            .set_transport("inproc://node-handover/out");
        let mut second = TaskNode::with_config(&m, "second", test_config(Duration::from_millis(1)), idle);
        second
            .add_output_port("OUT", DataType::Double, 1)
            .unwrap()
            .set_transport("inproc://node-handover/out");

        first.start().unwrap();
        assert!(matches!(second.start(), Err(StartError::Setup { .. })));
        assert_eq!(first.stop(), StopOutcome::Stopped);
        second.start().unwrap();
        assert_eq!(second.stop(), StopOutcome::Stopped);
    }

    #[test]
    fn overrunning_body_misses_every_deadline() {
        let m = manager();
        let body = |_: &mut Ports| -> anyhow::Result<()> {
            thread::sleep(Duration::from_millis(15));
            Ok(())
        };
        let mut node = TaskNode::with_config(&m, "slow", test_config(Duration::from_millis(5)), body);
        node.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(node.stop(), StopOutcome::Stopped);

        let iterations = node.iterations();
        assert!(iterations >= 3);
        // One miss per late iteration, no compensating extra runs.
        assert_eq!(node.missed_deadlines(), iterations);
    }

    #[test]
    fn run_errors_are_counted_and_loop_continues() {
        let m = manager();
        let body = |_: &mut Ports| -> anyhow::Result<()> { anyhow::bail!("sensor offline") };
        let mut node = TaskNode::with_config(&m, "err", test_config(Duration::from_millis(1)), body);
        node.start().unwrap();
        thread::sleep(Duration::from_millis(10));
        node.stop();
        assert!(node.run_errors() >= 2);
        assert_eq!(node.run_errors(), node.iterations());
    }

    #[test]
    fn out_of_range_affinity_runs_unpinned() {
        let m = Arc::new(TaskManager::with_cpu_count(2));
        let mut cfg = test_config(Duration::from_millis(1));
        cfg.affinity = CpuAffinity::Core(7);
        let mut node = TaskNode::with_config(&m, "affine", cfg, idle);
        let report = node.start().unwrap();
        assert_eq!(
            report.affinity,
            AffinityOutcome::OutOfRange {
                requested: 7,
                cpu_count: 2
            }
        );
        assert_eq!(node.stop(), StopOutcome::Stopped);
    }

    #[test]
    fn setup_error_fails_start_and_keeps_body() {
        struct FailingSetup;
        impl Task for FailingSetup {
            fn setup(&mut self, _: &mut Ports) -> anyhow::Result<()> {
                anyhow::bail!("no hardware")
            }
            fn run(&mut self, _: &mut Ports) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let m = manager();
        let mut node = TaskNode::with_config(&m, "bad", test_config(Duration::from_millis(1)), FailingSetup);
        let err = node.start().unwrap_err();
        assert!(matches!(err, StartError::Setup { .. }));
        assert_ne!(err.code(), 0);
        assert_eq!(node.state(), TaskState::Failed);
        // Body came back; a second attempt fails the same way.
        assert!(matches!(node.start(), Err(StartError::Setup { .. })));
    }

    #[test]
    fn stack_below_floor_fails_start() {
        let m = manager();
        let mut node = TaskNode::new(&m, "tiny", idle);
        node.shared.config.write().stack_size = 1;
        assert!(matches!(
            node.start(),
            Err(StartError::StackSize { requested: 1, .. })
        ));
        assert_eq!(node.state(), TaskState::Idle);
    }

    #[test]
    fn bind_conflict_surfaces_as_setup_error() {
        let m = manager();
        let mut a = TaskNode::with_config(&m, "a", test_config(Duration::from_millis(1)), idle);
        let mut b = TaskNode::with_config(&m, "b", test_config(Duration::from_millis(1)), idle);
        for node in [&mut a, &mut b] {
            node.add_output_port("OUT", DataType::Double, 1)
                .unwrap()
                .set_transport("inproc://task-tests/conflict");
        }
        a.start().unwrap();
        assert!(matches!(b.start(), Err(StartError::Setup { .. })));
        a.stop();
    }

    #[test]
    fn ports_are_unavailable_while_running() {
        let m = manager();
        let mut node = TaskNode::with_config(&m, "busy", test_config(Duration::from_millis(1)), idle);
        node.start().unwrap();
        assert!(matches!(
            node.add_input_port("X", DataType::Double, 1),
            Err(PortError::TaskRunning { .. })
        ));
        node.stop();
        assert!(node.add_input_port("X", DataType::Double, 1).is_ok());
    }

    // ── End-to-end ────────────────────────────────────────────────────────────

    #[test]
    fn latest_value_flows_between_two_tasks() {
        let m = manager();
        let address = "inproc://task-tests/a-to-b";
        let script = Arc::new(Mutex::new(vec![[3.0, 4.0], [1.0, 2.0]]));
        let received = Arc::new(Mutex::new(Vec::<[f64; 2]>::new()));

        let to_send = Arc::clone(&script);
        let a_body = move |ports: &mut Ports| -> anyhow::Result<()> {
            if let Some(v) = to_send.lock().unwrap().pop() {
                ports.output("OUT")?.send_values(&v)?;
            }
            Ok(())
        };
        let sink = Arc::clone(&received);
        let b_body = move |ports: &mut Ports| -> anyhow::Result<()> {
            let mut v = [0.0; 2];
            if ports.input("IN")?.receive_values(&mut v)? {
                sink.lock().unwrap().push(v);
            }
            Ok(())
        };

        let mut a = TaskNode::with_config(&m, "A", test_config(Duration::from_millis(1)), a_body);
        a.add_output_port("OUT", DataType::Double, 2).unwrap().set_transport(address);
        // B polls slower than A publishes, so the first message is overwritten.
        let mut b = TaskNode::with_config(&m, "B", test_config(Duration::from_millis(20)), b_body);
        b.add_input_port("IN", DataType::Double, 2).unwrap().set_transport(address);

        // Subscribers only see messages published after they connect.
        b.start().unwrap();
        thread::sleep(Duration::from_millis(5));
        a.start().unwrap();
        thread::sleep(Duration::from_millis(70));
        a.stop();
        b.stop();

        assert_eq!(*received.lock().unwrap(), vec![[3.0, 4.0]]);
        assert_eq!(b.input_port("IN").unwrap().messages_received(), 1);
        assert_eq!(a.output_port("OUT").unwrap().messages_sent(), 2);
    }
}
