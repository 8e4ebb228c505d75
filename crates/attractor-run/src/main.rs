//! Attractor Run - simulate chaotic systems from the command line
//!
//! Thin collaborator over the engine crate: parses a run or sweep
//! description, executes it, and emits samples/summaries as JSON lines for
//! downstream plotting and export tools.

use std::io::{BufWriter, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attractor_engine::{
    ModelParams, RunConfig, Scheme, SweepDriver, analysis, linear_sweep, seeded_ensemble,
};

#[derive(Parser, Debug)]
#[command(name = "attractor-run")]
#[command(about = "Simulate chaotic dynamical systems (Lorenz and friends)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single trajectory and print its samples as JSON lines
    Simulate {
        /// Model tag: lorenz, rossler, chen
        #[arg(long, default_value = "lorenz")]
        model: String,

        /// Named parameters as name=value; omit for model defaults
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,

        /// Initial state components
        #[arg(long, num_args = 1.., default_values_t = [1.0, 1.0, 1.0])]
        initial: Vec<f64>,

        /// Integration method: euler, rk4, rk45
        #[arg(long, default_value = "rk4")]
        method: String,

        #[arg(long, default_value = "0.01")]
        dt: f64,

        #[arg(long, default_value = "10000")]
        steps: u64,

        /// Adaptive local error tolerance
        #[arg(long, default_value = "1e-6")]
        tolerance: f64,

        /// Seed for a random initial state instead of --initial
        #[arg(long)]
        random_ic: Option<u64>,

        /// Suppress per-sample output, print only the summary
        #[arg(long)]
        summary_only: bool,
    },

    /// Sweep one parameter over a range and print per-run summaries
    Sweep {
        #[arg(long, default_value = "lorenz")]
        model: String,

        /// Parameter to sweep
        #[arg(long)]
        parameter: String,

        /// Inclusive range bounds
        #[arg(long, num_args = 2)]
        range: Vec<f64>,

        /// Number of sweep points
        #[arg(long, default_value = "50")]
        steps: usize,

        /// Steps per run
        #[arg(long, default_value = "10000")]
        run_steps: u64,

        /// Concurrent runs
        #[arg(long, default_value = "4")]
        jobs: usize,
    },

    /// Compute equilibria or Lyapunov exponents and print them as JSON
    Analyze {
        #[arg(long, default_value = "lorenz")]
        model: String,

        /// Named parameters as name=value; omit for model defaults
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,

        /// What to compute: equilibria, lyapunov
        #[arg(long = "type", default_value = "equilibria")]
        kind: String,

        /// Initial state for the Lyapunov tangent-space run
        #[arg(long, num_args = 1.., default_values_t = [1.0, 1.0, 1.0])]
        initial: Vec<f64>,

        #[arg(long, default_value = "0.01")]
        dt: f64,

        /// Accumulation steps for the Lyapunov run
        #[arg(long, default_value = "20000")]
        steps: u64,

        /// Transient steps discarded before accumulating
        #[arg(long, default_value = "1000")]
        transient: u64,
    },

    /// Run an ensemble of seeded random initial conditions
    Ensemble {
        #[arg(long, default_value = "lorenz")]
        model: String,

        #[arg(long, default_value = "10")]
        count: usize,

        /// Standard deviation of the initial-condition cloud
        #[arg(long, default_value = "1.0")]
        scale: f64,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(long, default_value = "10000")]
        run_steps: u64,

        #[arg(long, default_value = "4")]
        jobs: usize,
    },
}

fn parse_param(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {s}"))?;
    let value: f64 = value
        .parse()
        .map_err(|e| format!("bad value for {name}: {e}"))?;
    Ok((name.to_string(), value))
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attractor_run=info,attractor_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Simulate {
            model,
            params,
            initial,
            method,
            dt,
            steps,
            tolerance,
            random_ic,
            summary_only,
        } => {
            let scheme = Scheme::parse(&method)
                .ok_or_else(|| format!("unknown method: {method}"))?;
            let mut config = RunConfig {
                model,
                scheme,
                dt,
                tolerance,
                initial_state: initial,
                max_steps: Some(steps),
                ..Default::default()
            };
            config.params = params.into_iter().collect();
            if let Some(seed) = random_ic {
                let kind = attractor_engine::ModelKind::parse(&config.model)?;
                config.initial_state =
                    attractor_engine::rng::random_initial_state(kind.dim(), 1.0, seed);
                info!(seed, state = ?config.initial_state, "seeded initial state");
            }

            let outcome = attractor_engine::run(&config)?;
            info!(
                status = %outcome.status,
                samples = outcome.trajectory.len(),
                final_t = outcome.final_t,
                "simulation finished"
            );

            let stdout = std::io::stdout().lock();
            let mut out = BufWriter::new(stdout);
            if !summary_only {
                for sample in outcome.trajectory.iter() {
                    serde_json::to_writer(&mut out, sample)?;
                    out.write_all(b"\n")?;
                }
            }
            serde_json::to_writer(
                &mut out,
                &serde_json::json!({
                    "status": outcome.status,
                    "samples": outcome.trajectory.len(),
                    "accepted_steps": outcome.accepted_steps,
                    "final_t": outcome.final_t,
                }),
            )?;
            out.write_all(b"\n")?;
            out.flush()?;
            Ok(())
        }

        Command::Sweep { model, parameter, range, steps, run_steps, jobs } => {
            let base = RunConfig {
                model,
                max_steps: Some(run_steps),
                ..Default::default()
            };
            let configs = linear_sweep(&base, &parameter, (range[0], range[1]), steps)?;
            run_batch(configs, jobs)
        }

        Command::Analyze { model, params, kind, initial, dt, steps, transient } => {
            let model_kind = attractor_engine::ModelKind::parse(&model)?;
            let params = params.into_iter().collect();
            let resolved = model_kind.resolve_params(&params)?;

            let stdout = std::io::stdout().lock();
            let mut out = BufWriter::new(stdout);
            match kind.as_str() {
                "equilibria" => {
                    let ModelParams::Lorenz(lorenz) = &resolved else {
                        return Err(format!("equilibria are only tabulated for lorenz, got {model}").into());
                    };
                    let points = analysis::lorenz_equilibria(lorenz);
                    serde_json::to_writer(
                        &mut out,
                        &serde_json::json!({ "model": model, "equilibria": points }),
                    )?;
                }
                "lyapunov" => {
                    let exponents =
                        analysis::lyapunov_exponents(&resolved, &initial, dt, steps, transient);
                    info!(?exponents, "lyapunov spectrum computed");
                    serde_json::to_writer(
                        &mut out,
                        &serde_json::json!({
                            "model": model,
                            "dt": dt,
                            "steps": steps,
                            "exponents": exponents,
                        }),
                    )?;
                }
                other => return Err(format!("unknown analysis type: {other}").into()),
            }
            out.write_all(b"\n")?;
            out.flush()?;
            Ok(())
        }

        Command::Ensemble { model, count, scale, seed, run_steps, jobs } => {
            let base = RunConfig {
                model,
                max_steps: Some(run_steps),
                ..Default::default()
            };
            let configs = seeded_ensemble(&base, count, scale, seed)?;
            run_batch(configs, jobs)
        }
    }
}

fn run_batch(
    configs: Vec<RunConfig>,
    jobs: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = SweepDriver::new(configs, jobs)?.run()?;

    let stdout = std::io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    for entry in &report.entries {
        let line = match &entry.result {
            Ok(outcome) => serde_json::json!({
                "index": entry.index,
                "params": entry.config.params,
                "initial_state": entry.config.initial_state,
                "status": outcome.status,
                "samples": outcome.trajectory.len(),
                "final_state": outcome.trajectory.last().map(|s| s.state.clone()),
            }),
            Err(e) => serde_json::json!({
                "index": entry.index,
                "error": e.to_string(),
            }),
        };
        serde_json::to_writer(&mut out, &line)?;
        out.write_all(b"\n")?;
    }
    serde_json::to_writer(&mut out, &report.summary)?;
    out.write_all(b"\n")?;
    out.flush()?;

    info!(
        completed = report.summary.completed,
        diverged = report.summary.diverged,
        "sweep finished"
    );
    Ok(())
}
