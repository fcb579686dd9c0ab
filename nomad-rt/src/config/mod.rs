/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pipeline configuration loading.
//!
//! Scheduling parameters and port wiring of every task can be kept in one
//! YAML file instead of code:
//! ```yaml
//! tasks:
//!   plant:
//!     frequency_hz: 50          # or period_us: 20000
//!     priority: 50              # 1 = most urgent … 99
//!     policy: fifo              # normal | fifo | round_robin
//!     cpu_affinity: 1           # -1 = any core
//!     stack_size: 262144
//!     stop_grace_ms: 200
//!     inputs:
//!       FORCES: "inproc://nomad/forces"
//!     outputs:
//!       STATE: "inproc://nomad/state"
//! ```
//!
//! Every field is optional; absent values keep the node's current setting.
//! [`TaskNode::apply_settings`](crate::task::TaskNode::apply_settings) applies
//! one entry to a node.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::task::{CpuAffinity, Priority, SchedPolicy, TaskConfig};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
struct PipelineFile {
    #[serde(default)]
    tasks: BTreeMap<String, TaskEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskEntry {
    frequency_hz: Option<f64>,
    period_us: Option<u64>,
    priority: Option<i64>,
    policy: Option<String>,
    cpu_affinity: Option<i64>,
    stack_size: Option<usize>,
    stop_grace_ms: Option<u64>,
    #[serde(default)]
    inputs: BTreeMap<String, String>,
    #[serde(default)]
    outputs: BTreeMap<String, String>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// How the period of a task is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rate {
    Frequency(f64),
    Period(Duration),
}

/// Settings of one task as read from the configuration file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskSettings {
    pub name: String,
    pub rate: Option<Rate>,
    pub priority: Option<i64>,
    pub policy: Option<String>,
    pub cpu_affinity: Option<i64>,
    pub stack_size: Option<usize>,
    pub stop_grace: Option<Duration>,
    /// Input port name → transport address.
    pub inputs: BTreeMap<String, String>,
    /// Output port name → transport address.
    pub outputs: BTreeMap<String, String>,
}

impl TaskSettings {
    /// `base` with every field present in these settings overridden.
    pub fn to_task_config(&self, base: &TaskConfig) -> Result<TaskConfig, ConfigError> {
        let mut config = base.clone();
        match self.rate {
            Some(Rate::Frequency(hz)) => config.period = TaskConfig::period_from_frequency(hz)?,
            Some(Rate::Period(p)) => config.period = TaskConfig::check_period(p)?,
            None => {}
        }
        if let Some(p) = self.priority {
            config.priority = Priority::new(p)?;
        }
        if let Some(name) = &self.policy {
            config.policy = SchedPolicy::from_name(name)?;
        }
        if let Some(core) = self.cpu_affinity {
            config.affinity = CpuAffinity::from_raw(core);
        }
        if let Some(bytes) = self.stack_size {
            config.stack_size = TaskConfig::check_stack_size(bytes)?;
        }
        if self.stop_grace.is_some() {
            config.stop_grace = self.stop_grace;
        }
        Ok(config)
    }

    fn from_entry(name: String, entry: TaskEntry) -> Result<Self> {
        let rate = match (entry.frequency_hz, entry.period_us) {
            (Some(_), Some(_)) => {
                bail!("task '{name}': give either frequency_hz or period_us, not both")
            }
            (Some(hz), None) => Some(Rate::Frequency(hz)),
            (None, Some(us)) => Some(Rate::Period(Duration::from_micros(us))),
            (None, None) => None,
        };
        Ok(Self {
            name,
            rate,
            priority: entry.priority,
            policy: entry.policy,
            cpu_affinity: entry.cpu_affinity,
            stack_size: entry.stack_size,
            stop_grace: entry.stop_grace_ms.map(Duration::from_millis),
            inputs: entry.inputs,
            outputs: entry.outputs,
        })
    }
}

// ── PipelineConfigManager ─────────────────────────────────────────────────────

/// Loads and holds the task settings of a pipeline from a YAML file.
#[derive(Debug, Default)]
pub struct PipelineConfigManager {
    /// Map of task name → [`TaskSettings`].
    tasks: BTreeMap<String, TaskSettings>,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl PipelineConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces all previously loaded settings.
    ///
    /// Every entry is checked against the default [`TaskConfig`] so that an
    /// out-of-range priority or a bad policy name fails here, not at start.
    ///
    /// # Errors
    /// The file cannot be read, the YAML is invalid, or an entry holds an
    /// invalid value.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading pipeline configuration from: {}", path.display());

        self.tasks.clear();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: PipelineFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let mut tasks = BTreeMap::new();
        for (name, entry) in file.tasks {
            let settings = TaskSettings::from_entry(name.clone(), entry)?;
            settings
                .to_task_config(&TaskConfig::default())
                .with_context(|| format!("Invalid settings for task '{name}'"))?;

            debug!(
                "  Task: {} | rate: {:?} | priority: {:?} | policy: {:?} | affinity: {:?}",
                name, settings.rate, settings.priority, settings.policy, settings.cpu_affinity,
            );
            tasks.insert(name, settings);
        }

        if tasks.is_empty() {
            warn!("No tasks found in configuration file, nodes keep their built-in settings");
        }

        self.tasks = tasks;
        self.loaded = true;
        info!("Successfully loaded {} task configuration(s)", self.tasks.len());
        Ok(())
    }

    pub fn get_task_settings(&self, name: &str) -> Option<&TaskSettings> {
        self.tasks.get(name)
    }

    pub fn get_all_tasks(&self) -> &BTreeMap<String, TaskSettings> {
        &self.tasks
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
