/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! nomad-rt – periodic real-time tasks and latest-value port messaging
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── task/      – TaskNode, Task trait, periodic driver, clock, thread attributes
//! ├── port/      – Port, per-task port table, inproc/tcp transport context
//! ├── manager/   – TaskManager registry, utilisation diagnostics
//! ├── config/    – YAML pipeline configuration
//! └── error.rs   – ConfigError / StartError / PortError
//! ```
//!
//! A typical pipeline:
//!
//! ```no_run
//! use std::sync::Arc;
//! use nomad_rt::manager::TaskManager;
//! use nomad_rt::port::{DataType, Ports};
//! use nomad_rt::task::TaskNode;
//!
//! let manager = Arc::new(TaskManager::new());
//! let mut node = TaskNode::new(&manager, "counter", |ports: &mut Ports| -> anyhow::Result<()> {
//!     ports.output("COUNT")?.send_values(&[1.0_f64])?;
//!     Ok(())
//! });
//! node.add_output_port("COUNT", DataType::Double, 1)?
//!     .set_transport("inproc://demo/count");
//! node.set_task_frequency(100.0)?;
//! node.start()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod port;
pub mod task;
