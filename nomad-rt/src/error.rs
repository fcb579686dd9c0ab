/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for task nodes and ports.
//!
//! Three error enums model the three failure layers:
//!
//! * [`ConfigError`]: a scheduling parameter was rejected while a task was
//!   being configured (before any thread exists).
//! * [`StartError`]: [`TaskNode::start()`](crate::task::TaskNode::start)
//!   could not bring the task thread up.  Every variant maps to a non-zero
//!   status [`code()`](StartError::code).
//! * [`PortError`]: a port lookup, bind/connect or send/receive failed.
//!
//! "No new data since the last receive" is **not** an error: the receive
//! calls return `Ok(false)` / `Ok(None)` for it.
//!
//! | Variant | When | Recoverable at runtime |
//! |---|---|---|
//! | `ConfigError::*` | configuration time | no, fix the configuration |
//! | `StartError::StackSize` | before spawn | no |
//! | `StartError::Spawn` | thread creation | caller may retry or abort |
//! | `StartError::Policy` / `Priority` / `Affinity` | thread bring-up, on the task thread | caller may retry or abort |
//! | `StartError::Setup` | `Task::setup` failed (e.g. bind error) | caller decides |
//! | `PortError::NotFound` | port lookup | no, wiring bug |
//! | `PortError::AddressInUse` / `Bind` | `bind()` | no, wiring bug |

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::port::{DataType, Direction};

// ── Configuration ─────────────────────────────────────────────────────────────

/// A scheduling parameter was rejected at configuration time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `set_task_frequency` was given a rate that is zero, negative or not
    /// finite.
    #[error("task frequency must be a finite value > 0 Hz (got {0})")]
    InvalidFrequency(f64),

    /// The period is zero (or rounds to zero microseconds).
    #[error("task period must be at least 1µs (got {0:?})")]
    InvalidPeriod(Duration),

    /// Priority outside the 1–99 fixed-priority range.
    #[error("task priority {0} is outside the valid range 1..=99")]
    PriorityOutOfRange(i64),

    /// Requested stack is below the platform floor (`PTHREAD_STACK_MIN`).
    #[error("stack size {requested} bytes is below the platform minimum of {minimum} bytes")]
    StackTooSmall { requested: usize, minimum: usize },

    /// A scheduling policy name in a configuration file is not recognised.
    #[error("unknown scheduling policy '{0}' (valid: normal, fifo, round_robin)")]
    UnknownPolicy(String),
}

// ── Task start ────────────────────────────────────────────────────────────────

/// Failure returned by [`TaskNode::start()`](crate::task::TaskNode::start).
///
/// The task has **not** entered its periodic loop when any of these is
/// returned.  For the variants produced on the task thread (`Policy`,
/// `Priority`, `Affinity`, `Setup`) the thread may already have been partially
/// configured before it exited.
#[derive(Debug, Error)]
pub enum StartError {
    /// The task thread is already started or running.
    #[error("task '{task}' is already running")]
    AlreadyRunning { task: String },

    /// The task body was lost because a previous `stop()` had to detach an
    /// unresponsive thread.
    #[error("task '{task}' has no body to run (previous thread was detached)")]
    BodyUnavailable { task: String },

    /// Requested stack size is below the platform floor.
    #[error("task '{task}': stack size {requested} bytes is below the minimum of {minimum} bytes")]
    StackSize {
        task: String,
        requested: usize,
        minimum: usize,
    },

    /// The OS refused the scheduling policy (typically `EPERM` without
    /// `CAP_SYS_NICE`).
    #[error("task '{task}': failed to apply scheduling policy {policy}: {source}")]
    Policy {
        task: String,
        policy: &'static str,
        #[source]
        source: io::Error,
    },

    /// The priority is not valid for the selected policy.
    #[error("task '{task}': priority {priority} is invalid for policy {policy} (OS range {min}..={max})")]
    Priority {
        task: String,
        priority: i32,
        policy: &'static str,
        min: i32,
        max: i32,
    },

    /// Pinning the thread to its configured core failed.
    #[error("task '{task}': failed to set thread affinity to core {core}")]
    Affinity { task: String, core: usize },

    /// `std::thread::Builder::spawn` failed.
    #[error("task '{task}': failed to create thread: {source}")]
    Spawn {
        task: String,
        #[source]
        source: io::Error,
    },

    /// The task thread exited before reporting its start status.
    #[error("task '{task}': thread exited before reporting start status")]
    Handshake { task: String },

    /// `Task::setup` returned an error (for example a port bind failure).
    #[error("task '{task}': setup failed: {source:#}")]
    Setup {
        task: String,
        #[source]
        source: anyhow::Error,
    },
}

impl StartError {
    /// Non-zero status code for this failure.
    ///
    /// OS-originated failures return the underlying `errno` when one is
    /// available; the remaining variants use fixed negative codes so they
    /// never collide with an `errno` value.
    pub fn code(&self) -> i32 {
        match self {
            StartError::AlreadyRunning { .. } => -1,
            StartError::BodyUnavailable { .. } => -2,
            StartError::StackSize { .. } => libc::EINVAL,
            StartError::Policy { source, .. } => source.raw_os_error().unwrap_or(-3),
            StartError::Priority { .. } => libc::EINVAL,
            StartError::Affinity { .. } => -4,
            StartError::Spawn { source, .. } => source.raw_os_error().unwrap_or(-5),
            StartError::Handshake { .. } => -6,
            StartError::Setup { .. } => -7,
        }
    }
}

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Port lookup, wiring and I/O failures.
#[derive(Debug, Error)]
pub enum PortError {
    /// No port with this name exists in the table.
    #[error("no {direction} port named '{name}'")]
    NotFound { name: String, direction: Direction },

    /// A port with this name is already declared.
    #[error("{direction} port '{name}' is already declared")]
    Duplicate { name: String, direction: Direction },

    /// The fixed-capacity port table is full.
    #[error("cannot add {direction} port '{name}': table capacity {capacity} reached")]
    TableFull {
        name: String,
        direction: Direction,
        capacity: usize,
    },

    /// The operation is only valid for the opposite direction
    /// (e.g. `bind` on an input port).
    #[error("port '{name}': {operation} is not valid on an {direction} port")]
    WrongDirection {
        name: String,
        operation: &'static str,
        direction: Direction,
    },

    /// The port table is on the task thread while the task runs.
    #[error("ports of task '{task}' are owned by its running thread")]
    TaskRunning { task: String },

    /// `bind`/`connect` called without a transport address.
    #[error("port '{name}' has no transport address")]
    NoTransport { name: String },

    /// The transport address could not be parsed or resolved.
    #[error("invalid transport address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// `bind`/`connect` called on a port that already has an open endpoint.
    #[error("port '{name}' is already open on '{address}'")]
    AlreadyOpen { name: String, address: String },

    /// Send/receive before `bind`/`connect`.
    #[error("port '{name}' is not bound or connected")]
    NotOpen { name: String },

    /// Another output port already binds this address.
    #[error("transport address '{address}' is already bound")]
    AddressInUse { address: String },

    /// The OS refused to bind the network address.
    #[error("failed to bind '{address}': {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The transport I/O runtime could not be started.
    #[error("failed to start transport I/O runtime: {0}")]
    Runtime(#[source] io::Error),

    /// Payload byte length differs from the port's declared length.
    #[error("port '{name}': payload is {actual} bytes, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Typed send/receive used an element type other than the declared one.
    #[error("port '{name}': element type {actual} does not match declared {expected}")]
    TypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_codes_are_non_zero() {
        let errors = vec![
            StartError::AlreadyRunning { task: "t".into() },
            StartError::BodyUnavailable { task: "t".into() },
            StartError::StackSize {
                task: "t".into(),
                requested: 1,
                minimum: 2,
            },
            StartError::Policy {
                task: "t".into(),
                policy: "SCHED_FIFO",
                source: io::Error::from_raw_os_error(libc::EPERM),
            },
            StartError::Affinity {
                task: "t".into(),
                core: 3,
            },
            StartError::Handshake { task: "t".into() },
            StartError::Setup {
                task: "t".into(),
                source: anyhow::anyhow!("boom"),
            },
        ];
        for e in errors {
            assert_ne!(e.code(), 0, "{e} must carry a non-zero status");
        }
    }

    #[test]
    fn policy_error_code_is_errno() {
        let e = StartError::Policy {
            task: "t".into(),
            policy: "SCHED_FIFO",
            source: io::Error::from_raw_os_error(libc::EPERM),
        };
        assert_eq!(e.code(), libc::EPERM);
    }

    #[test]
    fn port_error_messages_name_the_port() {
        let e = PortError::NotFound {
            name: "FORCES".into(),
            direction: Direction::Input,
        };
        assert_eq!(e.to_string(), "no input port named 'FORCES'");
    }
}
