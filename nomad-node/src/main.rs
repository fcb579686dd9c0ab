/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

mod tasks;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use nomad_rt::config::PipelineConfigManager;
use nomad_rt::manager::TaskManager;
use nomad_rt::port::{DataType, Port, PortSpec};
use nomad_rt::task::{Priority, SchedPolicy, StopOutcome, TaskConfig, TaskNode};

use tasks::{controller, estimator, plant, topics, Idx, NUM_STATES};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Nomad control pipeline: plant → estimator → controller as real-time tasks.
///
/// Example:
///   nomad-node --config nomad-node/config/pipeline.yaml --duration 30
///   nomad-node --no-rt --setpoint 1.5
#[derive(Debug, Parser)]
#[command(
    name = "nomad-node",
    about = "Nomad control pipeline – real-time task node demo",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML pipeline configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Seconds to run before stopping all tasks (0 = until killed).
    #[arg(short = 'd', long = "duration", default_value_t = 10)]
    duration: u64,

    /// Use SCHED_OTHER for every task (no CAP_SYS_NICE needed).
    #[arg(long = "no-rt", default_value_t = false)]
    no_rt: bool,

    /// Position setpoint of the controller, m.
    #[arg(short = 's', long = "setpoint", default_value_t = 0.5, allow_negative_numbers = true)]
    setpoint: f64,

    /// Seconds between status reports.
    #[arg(short = 'r', long = "report-interval", default_value_t = 1)]
    report_interval: u64,
}

// ── Built-in task parameters ──────────────────────────────────────────────────

fn builtin_config(name: &str) -> TaskConfig {
    let (hz, priority) = match name {
        plant::NAME => (500.0, Priority::HIGH),
        estimator::NAME => (250.0, Priority::MEDIUM),
        _ => (100.0, Priority::HIGH),
    };
    TaskConfig {
        period: Duration::from_micros((1e6 / hz) as u64),
        priority,
        ..Default::default()
    }
}

/// Built-in parameters overridden by the configuration file, if any.
fn task_config(pipeline: &PipelineConfigManager, name: &str) -> anyhow::Result<TaskConfig> {
    let base = builtin_config(name);
    match pipeline.get_task_settings(name) {
        Some(settings) => settings
            .to_task_config(&base)
            .with_context(|| format!("Invalid settings for task '{name}'")),
        None => Ok(base),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Nomad node starting up...");

    let cli = Cli::parse();

    info!(
        config          = ?cli.config,
        duration_s      = cli.duration,
        no_rt           = cli.no_rt,
        setpoint        = cli.setpoint,
        report_interval = cli.report_interval,
        "Configuration"
    );

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    // ── Load pipeline configuration ───────────────────────────────────────────
    let mut pipeline = PipelineConfigManager::new();
    match &cli.config {
        Some(path) => pipeline
            .load_from_file(path)
            .context("Failed to load pipeline configuration")?,
        None => warn!("No pipeline configuration file provided, using built-in task settings"),
    }

    // ── Build the task graph ──────────────────────────────────────────────────
    let manager = Arc::new(TaskManager::new());

    let mut nodes: Vec<TaskNode> = vec![
        plant::node(&manager, task_config(&pipeline, plant::NAME)?)?,
        estimator::node(&manager, task_config(&pipeline, estimator::NAME)?)?,
        controller::node(
            &manager,
            task_config(&pipeline, controller::NAME)?,
            cli.setpoint,
        )?,
    ];

    for name in pipeline.get_all_tasks().keys() {
        if !nodes.iter().any(|n| n.name() == name) {
            warn!(task = %name, "configuration names an unknown task, ignored");
        }
    }

    for node in &mut nodes {
        if let Some(settings) = pipeline.get_task_settings(node.name()) {
            node.apply_settings(settings)?;
        }
        if cli.no_rt {
            node.set_policy(SchedPolicy::Normal);
        }
    }

    // A passive tap on the plant state, for the status reports.
    let mut monitor = Port::new(
        PortSpec::input("STATE_MONITOR", DataType::Double, NUM_STATES).with_transport(topics::STATE),
        Arc::clone(manager.context()),
    );

    // ── Start ─────────────────────────────────────────────────────────────────
    for node in &mut nodes {
        node.start()
            .with_context(|| format!("Failed to start task '{}'", node.name()))?;
    }
    monitor.connect().context("Failed to connect state monitor")?;

    manager.print_active_tasks();

    // ── Run ───────────────────────────────────────────────────────────────────
    let started = Instant::now();
    let run_for = Duration::from_secs(cli.duration);
    let interval = Duration::from_secs(cli.report_interval.max(1));
    let mut state = [0.0_f64; NUM_STATES];

    loop {
        let remaining = if cli.duration == 0 {
            interval
        } else {
            match run_for.checked_sub(started.elapsed()) {
                Some(r) if !r.is_zero() => r.min(interval),
                _ => break,
            }
        };
        thread::sleep(remaining);

        if monitor.receive_values(&mut state)? {
            info!(
                x = state[Idx::X],
                x_dot = state[Idx::X_DOT],
                setpoint = cli.setpoint,
                "plant state"
            );
        } else {
            warn!("no plant state since last report");
        }
        manager.print_active_tasks();
    }

    // ── Stop ──────────────────────────────────────────────────────────────────
    // Reverse start order: consumers first.
    for node in nodes.iter_mut().rev() {
        match node.stop() {
            StopOutcome::Stopped | StopOutcome::NotRunning => {}
            outcome => warn!(task = %node.name(), ?outcome, "task did not stop cleanly"),
        }
    }
    info!("Nomad node shut down");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["nomad-node"]);
        assert_eq!(cli.duration, 10);
        assert!(!cli.no_rt);
        assert_eq!(cli.setpoint, 0.5);
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::parse_from([
            "nomad-node",
            "--config",
            "pipeline.yaml",
            "--no-rt",
            "--duration",
            "0",
            "--setpoint",
            "1.5",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("pipeline.yaml")));
        assert!(cli.no_rt);
        assert_eq!(cli.duration, 0);
        assert_eq!(cli.setpoint, 1.5);
    }

    #[test]
    fn builtin_rates() {
        assert_eq!(builtin_config(plant::NAME).period, Duration::from_millis(2));
        assert_eq!(builtin_config(controller::NAME).period, Duration::from_millis(10));
    }

    #[test]
    fn pipeline_runs_closed_loop() {
        let manager = Arc::new(TaskManager::with_cpu_count(1));
        let normal = |name: &str| TaskConfig {
            policy: SchedPolicy::Normal,
            ..builtin_config(name)
        };
        let mut nodes = vec![
            plant::node(&manager, normal(plant::NAME)).unwrap(),
            estimator::node(&manager, normal(estimator::NAME)).unwrap(),
            controller::node(&manager, normal(controller::NAME), 0.5).unwrap(),
        ];
        for node in &mut nodes {
            node.start().unwrap();
        }
        thread::sleep(Duration::from_millis(200));
        for node in nodes.iter_mut().rev() {
            assert_eq!(node.stop(), StopOutcome::Stopped);
        }
        for node in &nodes {
            assert!(node.iterations() > 0, "{} never ran", node.name());
            assert_eq!(node.run_errors(), 0, "{} reported errors", node.name());
        }
        assert_eq!(manager.len(), 3);
    }
}
