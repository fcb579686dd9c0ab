/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Simulated plant: a rigid block sliding along one axis.

use std::sync::Arc;
use std::time::Duration;

use nomad_rt::manager::TaskManager;
use nomad_rt::port::{DataType, Ports};
use nomad_rt::task::{Task, TaskConfig, TaskNode};
use tracing::debug;

use super::{topics, Idx, StateVector, NUM_STATES};

pub const NAME: &str = "plant";
pub const MASS_KG: f64 = 20.0;
pub const GRAVITY: f64 = 9.81;

// ── Rigid block ───────────────────────────────────────────────────────────────

/// Double integrator `m·ẍ = u`, discretised with a zero-order hold:
///
/// ```text
/// x[k+1] = A·x[k] + B·u[k]
/// A = | 1  T |      B = | T²/(2m) |
///     | 0  1 |          |  T/m    |
/// ```
#[derive(Debug, Clone)]
pub struct RigidBlock1D {
    a: [[f64; 2]; 2],
    b: [f64; 2],
    /// `[position, velocity]`
    state: [f64; 2],
}

impl RigidBlock1D {
    pub fn new(mass: f64, dt: Duration) -> Self {
        let t = dt.as_secs_f64();
        Self {
            a: [[1.0, t], [0.0, 1.0]],
            b: [t * t / (2.0 * mass), t / mass],
            state: [0.0, 0.0],
        }
    }

    pub fn set_state(&mut self, position: f64, velocity: f64) {
        self.state = [position, velocity];
    }

    pub fn state(&self) -> [f64; 2] {
        self.state
    }

    pub fn step(&mut self, force: f64) {
        let [x, v] = self.state;
        self.state = [
            self.a[0][0] * x + self.a[0][1] * v + self.b[0] * force,
            self.a[1][0] * x + self.a[1][1] * v + self.b[1] * force,
        ];
    }
}

// ── Task body ─────────────────────────────────────────────────────────────────

/// Steps the block once per period with the newest force (or the last one
/// held) and publishes the full state vector.
pub struct Plant {
    block: RigidBlock1D,
    force: f64,
    state: StateVector,
}

impl Plant {
    pub fn new(dt: Duration) -> Self {
        let mut state = [0.0; NUM_STATES];
        state[Idx::GRAVITY] = GRAVITY;
        let mut block = RigidBlock1D::new(MASS_KG, dt);
        block.set_state(state[Idx::X], state[Idx::X_DOT]);
        Self {
            block,
            force: 0.0,
            state,
        }
    }
}

impl Task for Plant {
    fn run(&mut self, ports: &mut Ports) -> anyhow::Result<()> {
        let mut u = [0.0];
        if ports.input("FORCES")?.receive_values(&mut u)? {
            self.force = u[0];
        } else {
            debug!(force = self.force, "plant: no new force, holding last");
        }
        self.block.step(self.force);

        let [x, x_dot] = self.block.state();
        self.state[Idx::X] = x;
        self.state[Idx::X_DOT] = x_dot;
        ports.output("STATE")?.send_values(&self.state)?;
        Ok(())
    }
}

/// Plant node with its ports declared on the default topics.
pub fn node(manager: &Arc<TaskManager>, config: TaskConfig) -> anyhow::Result<TaskNode> {
    let body = Plant::new(config.period);
    let mut node = TaskNode::with_config(manager, NAME, config, body);
    node.add_input_port("FORCES", DataType::Double, 1)?
        .set_transport(topics::FORCES);
    node.add_output_port("STATE", DataType::Double, NUM_STATES)?
        .set_transport(topics::STATE);
    Ok(node)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use nomad_rt::port::{Context, PortSpec};

    #[test]
    fn constant_force_matches_closed_form() {
        // x(t) = F/(2m) t² is exact under a zero-order hold
        let dt = Duration::from_millis(10);
        let mut block = RigidBlock1D::new(MASS_KG, dt);
        for _ in 0..100 {
            block.step(40.0);
        }
        let t = 1.0;
        let [x, v] = block.state();
        assert!((x - 40.0 / (2.0 * MASS_KG) * t * t).abs() < 1e-9, "x = {x}");
        assert!((v - 40.0 / MASS_KG * t).abs() < 1e-9, "v = {v}");
    }

    #[test]
    fn zero_force_keeps_velocity() {
        let mut block = RigidBlock1D::new(MASS_KG, Duration::from_millis(20));
        block.set_state(1.0, 0.5);
        block.step(0.0);
        assert_eq!(block.state(), [1.0 + 0.5 * 0.02, 0.5]);
    }

    fn wired(tag: &str) -> (Ports, Ports) {
        let ctx = Arc::new(Context::new());
        let forces = format!("inproc://plant-test/{tag}/forces");
        let state = format!("inproc://plant-test/{tag}/state");

        let mut plant = Ports::new(Arc::clone(&ctx));
        plant
            .add(PortSpec::input("FORCES", DataType::Double, 1).with_transport(&forces))
            .unwrap();
        plant
            .add(PortSpec::output("STATE", DataType::Double, NUM_STATES).with_transport(&state))
            .unwrap();

        let mut peer = Ports::new(ctx);
        peer.add(PortSpec::output("FORCES", DataType::Double, 1).with_transport(&forces))
            .unwrap();
        peer.add(PortSpec::input("STATE", DataType::Double, NUM_STATES).with_transport(&state))
            .unwrap();

        plant.bind_all().unwrap();
        peer.bind_all().unwrap();
        plant.connect_all().unwrap();
        peer.connect_all().unwrap();
        (plant, peer)
    }

    #[test]
    fn plant_holds_last_force() {
        let (mut ports, mut peer) = wired("hold");
        let mut plant = Plant::new(Duration::from_millis(10));

        peer.output("FORCES").unwrap().send_values(&[20.0]).unwrap();
        plant.run(&mut ports).unwrap();
        // No new force: the same force is applied again
        plant.run(&mut ports).unwrap();

        let mut state = [0.0; NUM_STATES];
        assert!(peer.input("STATE").unwrap().receive_values(&mut state).unwrap());
        // v = 2 · (F/m) · T
        assert!((state[Idx::X_DOT] - 2.0 * 20.0 / MASS_KG * 0.01).abs() < 1e-12);
        assert_eq!(state[Idx::GRAVITY], GRAVITY);
        assert_eq!(state[Idx::Z], 0.0);
    }
}
