/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Measured per-core utilisation and the Liu & Layland schedulability check.
//!
//! # Status: diagnostic only
//!
//! The bound is **computed and logged** by
//! [`TaskManager::print_active_tasks`](super::TaskManager::print_active_tasks).
//! Nothing is refused when it is exceeded: tasks keep running and overruns
//! show up in their missed-deadline counters.
//!
//! # Theory
//! **Liu & Layland (1973)**: under fixed priorities assigned rate-monotonically
//! (shorter period → more urgent), `n` independent periodic tasks on one CPU
//! are **guaranteed** schedulable if
//!
//! $$U = \sum_{i=1}^{n} \frac{C_i}{T_i} \leq n \left(2^{1/n} - 1\right)$$
//!
//! | n | Bound |
//! |---|---|
//! | 1 | 1.000 |
//! | 2 | 0.828 |
//! | 3 | 0.780 |
//! | ∞ | ln(2) ≈ 0.693 |
//!
//! Here `C_i` is the **measured** mean execution time of `run()`, so the
//! figure reflects the current load rather than a declared budget.

use std::collections::BTreeMap;

use super::TaskSnapshot;

// ── Public API ────────────────────────────────────────────────────────────────

/// Liu & Layland utilisation upper bound for `n` tasks:
/// `U_bound(n) = n × (2^(1/n) − 1)`.
///
/// `1.0` for `n = 1`, `0.0` for `n = 0`.
pub fn liu_layland_bound(n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    nf * (2.0_f64.powf(1.0 / nf) - 1.0)
}

/// Check a set of per-task utilisations sharing one core.
///
/// `None` if the set is provably schedulable (total ≤ bound),
/// `Some(total)` if the bound is exceeded.
pub fn check_liu_layland(utilizations: &[f64]) -> Option<f64> {
    if utilizations.is_empty() {
        return None;
    }
    let total: f64 = utilizations.iter().sum();
    if total > liu_layland_bound(utilizations.len()) {
        Some(total)
    } else {
        None
    }
}

/// Utilisation of the tasks sharing one core.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreUtilization {
    /// `None` groups the unpinned tasks.
    pub core: Option<usize>,
    pub tasks: Vec<String>,
    /// Mean execution time / period of each task, in `tasks` order.
    pub shares: Vec<f64>,
    /// Sum of `shares`.
    pub utilization: f64,
    /// Liu & Layland bound for this core; `None` for the unpinned group,
    /// whose tasks may migrate between cores.
    pub bound: Option<f64>,
}

impl CoreUtilization {
    /// `true` when this core is pinned and its tasks fail the Liu & Layland
    /// test.
    pub fn exceeds_bound(&self) -> bool {
        self.core.is_some() && check_liu_layland(&self.shares).is_some()
    }
}

/// Group tasks by pinned core and sum their measured utilisation.
///
/// Tasks that have not completed an iteration yet contribute nothing.
pub fn utilization_by_core(tasks: &[TaskSnapshot]) -> Vec<CoreUtilization> {
    let mut groups: BTreeMap<Option<usize>, (Vec<String>, Vec<f64>)> = BTreeMap::new();

    for t in tasks {
        if t.exec.samples == 0 || t.period.is_zero() {
            continue;
        }
        let u = t.exec.mean().as_secs_f64() / t.period.as_secs_f64();
        let entry = groups.entry(t.affinity.core()).or_default();
        entry.0.push(t.name.clone());
        entry.1.push(u);
    }

    groups
        .into_iter()
        .map(|(core, (names, shares))| CoreUtilization {
            core,
            utilization: shares.iter().sum(),
            bound: core.map(|_| liu_layland_bound(shares.len())),
            tasks: names,
            shares,
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
