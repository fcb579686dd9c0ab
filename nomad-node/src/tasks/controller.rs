/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Position controller: PD law driving the block to a setpoint.

use std::sync::Arc;

use nomad_rt::manager::TaskManager;
use nomad_rt::port::{DataType, Ports};
use nomad_rt::task::{Task, TaskConfig, TaskNode};
use tracing::trace;

use super::{topics, Idx, NUM_STATES};

pub const NAME: &str = "controller";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub kp: f64,
    pub kd: f64,
    /// Actuator limit, N.
    pub max_force: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            kp: 80.0,
            kd: 60.0,
            max_force: 200.0,
        }
    }
}

pub struct Controller {
    setpoint: f64,
    gains: Gains,
}

impl Controller {
    pub fn new(setpoint: f64, gains: Gains) -> Self {
        Self { setpoint, gains }
    }

    /// `u = kp·(x_ref − x) − kd·ẋ`, saturated at `±max_force`.
    pub fn force(&self, x: f64, x_dot: f64) -> f64 {
        let g = self.gains;
        (g.kp * (self.setpoint - x) - g.kd * x_dot).clamp(-g.max_force, g.max_force)
    }
}

impl Task for Controller {
    fn run(&mut self, ports: &mut Ports) -> anyhow::Result<()> {
        let mut est = [0.0; NUM_STATES];
        if !ports.input("STATE_HAT")?.receive_values(&mut est)? {
            return Ok(());
        }
        let u = self.force(est[Idx::X], est[Idx::X_DOT]);
        trace!(x = est[Idx::X], x_dot = est[Idx::X_DOT], force = u, "controller");
        ports.output("FORCES")?.send_values(&[u])?;
        Ok(())
    }
}

pub fn node(
    manager: &Arc<TaskManager>,
    config: TaskConfig,
    setpoint: f64,
) -> anyhow::Result<TaskNode> {
    let body = Controller::new(setpoint, Gains::default());
    let mut node = TaskNode::with_config(manager, NAME, config, body);
    node.add_input_port("STATE_HAT", DataType::Double, NUM_STATES)?
        .set_transport(topics::STATE_HAT);
    node.add_output_port("FORCES", DataType::Double, 1)?
        .set_transport(topics::FORCES);
    Ok(node)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
