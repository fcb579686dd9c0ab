/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! State estimator: republishes the plant state through a first-order
//! low-pass filter on the translational components.

use std::sync::Arc;

use nomad_rt::manager::TaskManager;
use nomad_rt::port::{DataType, Ports};
use nomad_rt::task::{Task, TaskConfig, TaskNode};

use super::{topics, Idx, StateVector, NUM_STATES};

pub const NAME: &str = "estimator";

/// Weight of a new measurement.
pub const DEFAULT_ALPHA: f64 = 0.5;

const FILTERED: [usize; 6] = [Idx::X, Idx::Y, Idx::Z, Idx::X_DOT, Idx::Y_DOT, Idx::Z_DOT];

pub struct Estimator {
    alpha: f64,
    estimate: Option<StateVector>,
}

impl Estimator {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            estimate: None,
        }
    }

    /// Fold one measurement into the estimate.
    pub fn update(&mut self, measured: &StateVector) -> &StateVector {
        let alpha = self.alpha;
        let est = self.estimate.get_or_insert(*measured);
        for (i, value) in est.iter_mut().enumerate() {
            if FILTERED.contains(&i) {
                *value += alpha * (measured[i] - *value);
            } else {
                *value = measured[i];
            }
        }
        est
    }
}

impl Task for Estimator {
    fn run(&mut self, ports: &mut Ports) -> anyhow::Result<()> {
        let mut measured = [0.0; NUM_STATES];
        if ports.input("STATE")?.receive_values(&mut measured)? {
            let est = *self.update(&measured);
            ports.output("STATE_HAT")?.send_values(&est)?;
        }
        Ok(())
    }
}

pub fn node(manager: &Arc<TaskManager>, config: TaskConfig) -> anyhow::Result<TaskNode> {
    let mut node = TaskNode::with_config(manager, NAME, config, Estimator::new(DEFAULT_ALPHA));
    node.add_input_port("STATE", DataType::Double, NUM_STATES)?
        .set_transport(topics::STATE);
    node.add_output_port("STATE_HAT", DataType::Double, NUM_STATES)?
        .set_transport(topics::STATE_HAT);
    Ok(node)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
