/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-task port table.
//!
//! Input and output ports are kept in two name-keyed tables, each with a
//! capacity fixed when the table is created.  Lookups return
//! [`PortError::NotFound`] instead of indexing out of range.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Context, Direction, Port, PortSpec};
use crate::error::PortError;

/// Default capacity of each of the input and output tables.
pub const DEFAULT_PORT_CAPACITY: usize = 16;

/// The ports owned by one task node.
#[derive(Debug)]
pub struct Ports {
    context: Arc<Context>,
    inputs: BTreeMap<String, Port>,
    outputs: BTreeMap<String, Port>,
    max_inputs: usize,
    max_outputs: usize,
}

impl Ports {
    pub fn new(context: Arc<Context>) -> Self {
        Self::with_capacity(context, DEFAULT_PORT_CAPACITY, DEFAULT_PORT_CAPACITY)
    }

    pub fn with_capacity(context: Arc<Context>, max_inputs: usize, max_outputs: usize) -> Self {
        Self {
            context,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            max_inputs,
            max_outputs,
        }
    }

    /// Declare a port.  The spec's direction selects the table.
    pub fn add(&mut self, spec: PortSpec) -> Result<&mut Port, PortError> {
        let direction = spec.direction;
        let (table, capacity) = match direction {
            Direction::Input => (&mut self.inputs, self.max_inputs),
            Direction::Output => (&mut self.outputs, self.max_outputs),
        };

        if table.contains_key(&spec.name) {
            return Err(PortError::Duplicate {
                name: spec.name,
                direction,
            });
        }
        if table.len() >= capacity {
            return Err(PortError::TableFull {
                name: spec.name,
                direction,
                capacity,
            });
        }

        let name = spec.name.clone();
        let port = Port::new(spec, Arc::clone(&self.context));
        Ok(table.entry(name).or_insert(port))
    }

    pub fn input(&mut self, name: &str) -> Result<&mut Port, PortError> {
        self.inputs.get_mut(name).ok_or_else(|| PortError::NotFound {
            name: name.to_string(),
            direction: Direction::Input,
        })
    }

    pub fn output(&mut self, name: &str) -> Result<&mut Port, PortError> {
        self.outputs.get_mut(name).ok_or_else(|| PortError::NotFound {
            name: name.to_string(),
            direction: Direction::Output,
        })
    }

    pub fn get_input(&self, name: &str) -> Result<&Port, PortError> {
        self.inputs.get(name).ok_or_else(|| PortError::NotFound {
            name: name.to_string(),
            direction: Direction::Input,
        })
    }

    pub fn get_output(&self, name: &str) -> Result<&Port, PortError> {
        self.outputs.get(name).ok_or_else(|| PortError::NotFound {
            name: name.to_string(),
            direction: Direction::Output,
        })
    }

    /// Connect every input port.  Convenience for `Task::setup`.
    pub fn connect_all(&mut self) -> Result<(), PortError> {
        self.inputs.values_mut().try_for_each(Port::connect)
    }

    /// Bind every output port.  Convenience for `Task::setup`.
    pub fn bind_all(&mut self) -> Result<(), PortError> {
        self.outputs.values_mut().try_for_each(Port::bind)
    }

    /// Close every open endpoint, releasing bound addresses.
    pub fn close_all(&mut self) {
        self.inputs
            .values_mut()
            .chain(self.outputs.values_mut())
            .for_each(Port::close);
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.outputs.values()
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
