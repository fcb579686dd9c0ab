/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task bodies of the demo control pipeline.
//!
//! ```text
//!   ┌────────┐ STATE (13×f64) ┌───────────┐ STATE_HAT (13×f64) ┌────────────┐
//!   │ plant  │───────────────►│ estimator │───────────────────►│ controller │
//!   └────────┘                └───────────┘                    └─────┬──────┘
//!        ▲                        FORCES (1×f64)                     │
//!        └───────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod estimator;
pub mod plant;

/// Default transport addresses of the pipeline.
pub mod topics {
    pub const STATE: &str = "inproc://nomad/state";
    pub const STATE_HAT: &str = "inproc://nomad/state_hat";
    pub const FORCES: &str = "inproc://nomad/forces";
}

/// Layout of the 13-element rigid-body state vector.
pub struct Idx;

#[allow(dead_code)]
impl Idx {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const Z: usize = 2;
    pub const X_DOT: usize = 3;
    pub const Y_DOT: usize = 4;
    pub const Z_DOT: usize = 5;
    pub const PHI: usize = 6;
    pub const THETA: usize = 7;
    pub const PSI: usize = 8;
    pub const W_X: usize = 9;
    pub const W_Y: usize = 10;
    pub const W_Z: usize = 11;
    pub const GRAVITY: usize = 12;
}

pub const NUM_STATES: usize = 13;

pub type StateVector = [f64; NUM_STATES];
