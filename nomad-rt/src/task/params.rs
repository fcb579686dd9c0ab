/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduling parameters of a task node.
//!
//! ```text
//! TaskConfig
//! ├── period      Duration   (µs resolution, default 10 ms / 100 Hz)
//! ├── priority    Priority   (1 = most urgent … 99 = least urgent)
//! ├── policy      SchedPolicy (Normal / Fifo / RoundRobin)
//! ├── affinity    CpuAffinity (Any / Core(n))
//! ├── stack_size  bytes      (≥ PTHREAD_STACK_MIN)
//! └── stop_grace  Option<Duration>
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::os;
use crate::error::ConfigError;

// ── Scheduling policy ─────────────────────────────────────────────────────────

/// Linux scheduling policy for a task thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    /// `SCHED_OTHER` – standard CFS scheduling; priority is ignored.
    Normal,
    /// `SCHED_FIFO` – real-time FIFO.
    #[default]
    Fifo,
    /// `SCHED_RR` – real-time round-robin.
    RoundRobin,
}

impl SchedPolicy {
    /// Convert to the integer value expected by the Linux kernel.
    pub fn to_linux_int(self) -> i32 {
        match self {
            SchedPolicy::Normal => 0,
            SchedPolicy::Fifo => 1,
            SchedPolicy::RoundRobin => 2,
        }
    }

    /// `true` for the fixed-priority real-time classes.
    pub fn is_realtime(self) -> bool {
        !matches!(self, SchedPolicy::Normal)
    }

    /// Kernel name of the policy, used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            SchedPolicy::Normal => "SCHED_OTHER",
            SchedPolicy::Fifo => "SCHED_FIFO",
            SchedPolicy::RoundRobin => "SCHED_RR",
        }
    }

    /// Parse a configuration name (`normal`, `fifo`, `round_robin`/`rr`).
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "normal" | "other" => Ok(SchedPolicy::Normal),
            "fifo" => Ok(SchedPolicy::Fifo),
            "round_robin" | "rr" => Ok(SchedPolicy::RoundRobin),
            _ => Err(ConfigError::UnknownPolicy(name.to_string())),
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Priority ──────────────────────────────────────────────────────────────────

/// Task urgency on the 1–99 scale, **smaller = more urgent**.
///
/// The Linux real-time classes rank the other way round (99 is the highest
/// `sched_priority`), so [`to_os_priority`](Self::to_os_priority) maps
/// `p → 100 − p` when the policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const HIGHEST: Priority = Priority(1);
    pub const HIGH: Priority = Priority(20);
    pub const MEDIUM: Priority = Priority(50);
    pub const LOW: Priority = Priority(80);
    pub const LOWEST: Priority = Priority(99);

    pub fn new(value: i64) -> Result<Self, ConfigError> {
        if (1..=99).contains(&value) {
            Ok(Priority(value as u8))
        } else {
            Err(ConfigError::PriorityOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// `sched_priority` for the fixed-priority classes.
    pub fn to_os_priority(self) -> i32 {
        100 - i32::from(self.0)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::MEDIUM
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── CPU affinity ──────────────────────────────────────────────────────────────

/// Core a task thread is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No preference; the OS may migrate the thread freely.
    #[default]
    Any,
    /// Pinned to one logical core.
    Core(usize),
}

impl CpuAffinity {
    /// Parse the raw configuration value: any negative number (conventionally
    /// `-1`) means "no affinity".
    pub fn from_raw(core: i64) -> Self {
        if core < 0 {
            CpuAffinity::Any
        } else {
            CpuAffinity::Core(core as usize)
        }
    }

    /// Raw form, `-1` for `Any`.
    pub fn to_raw(self) -> i64 {
        match self {
            CpuAffinity::Any => -1,
            CpuAffinity::Core(c) => c as i64,
        }
    }

    pub fn core(self) -> Option<usize> {
        match self {
            CpuAffinity::Any => None,
            CpuAffinity::Core(c) => Some(c),
        }
    }
}

impl fmt::Display for CpuAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuAffinity::Any => f.write_str("any"),
            CpuAffinity::Core(c) => write!(f, "core {c}"),
        }
    }
}

// ── TaskConfig ────────────────────────────────────────────────────────────────

/// Default task period: 10 000 µs (100 Hz).
pub const DEFAULT_PERIOD: Duration = Duration::from_micros(10_000);

/// Default thread stack size (256 KiB).
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Extra time granted on top of one period before `stop()` gives up waiting.
pub const DEFAULT_STOP_SLACK: Duration = Duration::from_millis(100);

/// Scheduling parameters of one task node.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub period: Duration,
    pub priority: Priority,
    pub policy: SchedPolicy,
    pub affinity: CpuAffinity,
    pub stack_size: usize,
    /// How long `stop()` waits for the thread to leave its loop.
    /// `None` = one period plus [`DEFAULT_STOP_SLACK`].
    pub stop_grace: Option<Duration>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            priority: Priority::default(),
            policy: SchedPolicy::default(),
            affinity: CpuAffinity::default(),
            stack_size: DEFAULT_STACK_SIZE,
            stop_grace: None,
        }
    }
}

impl TaskConfig {
    /// Period from a rate in Hz, rounded to whole microseconds.
    pub fn period_from_frequency(hz: f64) -> Result<Duration, ConfigError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(ConfigError::InvalidFrequency(hz));
        }
        let micros = (1e6 / hz).round();
        if micros < 1.0 {
            return Err(ConfigError::InvalidFrequency(hz));
        }
        Ok(Duration::from_micros(micros as u64))
    }

    /// Validate a period (at least one microsecond).
    pub fn check_period(period: Duration) -> Result<Duration, ConfigError> {
        if period < Duration::from_micros(1) {
            Err(ConfigError::InvalidPeriod(period))
        } else {
            Ok(period)
        }
    }

    /// Validate a stack size against the platform floor.
    pub fn check_stack_size(bytes: usize) -> Result<usize, ConfigError> {
        let minimum = os::min_stack_size();
        if bytes < minimum {
            Err(ConfigError::StackTooSmall {
                requested: bytes,
                minimum,
            })
        } else {
            Ok(bytes)
        }
    }

    /// Effective stop grace period.
    pub fn effective_stop_grace(&self) -> Duration {
        self.stop_grace
            .unwrap_or_else(|| self.period + DEFAULT_STOP_SLACK)
    }

    /// Configured rate in Hz.
    pub fn frequency_hz(&self) -> f64 {
        1.0 / self.period.as_secs_f64()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
