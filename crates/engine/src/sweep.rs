//! Parameter sweep driver
//!
//! Schedules independent runs across a set of configurations, up to a
//! configured parallelism, and collects results keyed by submission index.
//! Runs share nothing mutable, so a failed run never contaminates or aborts
//! its siblings.

use std::sync::{Arc, Mutex};
use std::thread;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::buffer::SharedBuffer;
use crate::config::RunConfig;
use crate::engine::{self, CancelToken};
use crate::error::{Error, Result};
use crate::rng;
use crate::types::{RunOutcome, RunStatus};

/// One sweep entry, in submission order.
#[derive(Debug, Clone)]
pub struct SweepEntry {
    /// Submission index
    pub index: usize,
    /// The configuration this run was scheduled with
    pub config: RunConfig,
    /// Finalized outcome, or the configuration error that rejected the run
    pub result: Result<RunOutcome>,
}

/// Status counts across a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub completed: usize,
    pub diverged: usize,
    pub underflow: usize,
    pub cancelled: usize,
    /// Runs rejected at setup by configuration errors
    pub invalid: usize,
}

impl SweepSummary {
    fn record(&mut self, result: &Result<RunOutcome>) {
        match result {
            Ok(outcome) => match outcome.status {
                RunStatus::Completed => self.completed += 1,
                RunStatus::Diverged => self.diverged += 1,
                RunStatus::StepSizeUnderflow => self.underflow += 1,
                RunStatus::Cancelled => self.cancelled += 1,
            },
            Err(_) => self.invalid += 1,
        }
    }
}

/// Collected results of one sweep.
#[derive(Debug)]
pub struct SweepReport {
    /// Entries in submission order, independent of completion order
    pub entries: Vec<SweepEntry>,
    pub summary: SweepSummary,
}

/// Observable state of one sweep run, keyed by submission index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting for a free worker slot
    Pending,
    /// Executing on a worker
    Running,
    /// Finalized with this status
    Finished(RunStatus),
    /// Rejected at setup by a configuration error
    Rejected,
}

/// Runs a batch of independent configurations on a scoped thread pool.
#[derive(Debug)]
pub struct SweepDriver {
    configs: Vec<RunConfig>,
    parallelism: usize,
    cancel: CancelToken,
    /// Per-run states, shared with any live [`SweepHandle`]
    states: Arc<Mutex<Vec<RunState>>>,
}

impl SweepDriver {
    /// Validate the sweep shape. Empty run lists and zero parallelism are
    /// configuration errors.
    pub fn new(configs: Vec<RunConfig>, parallelism: usize) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::InvalidSweep("empty run list".to_string()));
        }
        if parallelism == 0 {
            return Err(Error::InvalidSweep("parallelism must be positive".to_string()));
        }
        let states = Arc::new(Mutex::new(vec![RunState::Pending; configs.len()]));
        Ok(Self { configs, parallelism, cancel: CancelToken::new(), states })
    }

    /// Token shared by every run in the sweep; cancelling it stops all
    /// in-flight runs cooperatively.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the sweep on a worker thread and return a handle for polling
    /// per-run states while it is in flight.
    pub fn spawn(self) -> SweepHandle {
        let states = Arc::clone(&self.states);
        let cancel = self.cancel.clone();
        let join = thread::spawn(move || self.run());
        SweepHandle { states, cancel, join }
    }

    /// Execute every run and wait for all of them to finalize.
    #[instrument(skip_all, name = "sweep", fields(runs = self.configs.len(), parallelism = self.parallelism))]
    pub fn run(&self) -> Result<SweepReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .build()
            .map_err(|e| Error::InvalidSweep(e.to_string()))?;

        info!("sweep started");

        // par_iter + collect preserves submission order regardless of
        // completion order
        let entries: Vec<SweepEntry> = pool.install(|| {
            self.configs
                .par_iter()
                .enumerate()
                .map(|(index, config)| {
                    let result = self.execute_one(index, config);
                    SweepEntry { index, config: config.clone(), result }
                })
                .collect()
        });

        let mut summary = SweepSummary::default();
        for entry in &entries {
            summary.record(&entry.result);
        }

        info!(
            completed = summary.completed,
            diverged = summary.diverged,
            underflow = summary.underflow,
            cancelled = summary.cancelled,
            invalid = summary.invalid,
            "sweep finalized"
        );
        Ok(SweepReport { entries, summary })
    }

    fn execute_one(&self, index: usize, config: &RunConfig) -> Result<RunOutcome> {
        self.set_state(index, RunState::Running);
        let resolved = match config.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                self.set_state(index, RunState::Rejected);
                return Err(e);
            }
        };
        let buffer = SharedBuffer::new(resolved.max_buffer_size);
        debug!(index, model = %resolved.model, "sweep run scheduled");
        let outcome = engine::execute(&resolved, &buffer, &self.cancel);
        self.set_state(index, RunState::Finished(outcome.status));
        Ok(outcome)
    }

    fn set_state(&self, index: usize, state: RunState) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states[index] = state;
    }
}

/// Handle to a sweep running on a worker thread.
///
/// Mirrors the single-run [`RunHandle`](crate::engine::RunHandle): per-run
/// states can be polled while the sweep is in flight, the whole sweep can
/// be cancelled, and `join` returns the final report.
#[derive(Debug)]
pub struct SweepHandle {
    states: Arc<Mutex<Vec<RunState>>>,
    cancel: CancelToken,
    join: thread::JoinHandle<Result<SweepReport>>,
}

impl SweepHandle {
    /// Current state of the run at `index`, or `None` if out of range.
    pub fn run_state(&self, index: usize) -> Option<RunState> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.get(index).copied()
    }

    /// Snapshot of every run's state, in submission order.
    pub fn run_states(&self) -> Vec<RunState> {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Request cooperative cancellation of every run in the sweep.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the sweep to finalize and return its report.
    pub fn join(self) -> Result<SweepReport> {
        self.join
            .join()
            .unwrap_or_else(|_| Err(Error::InvalidSweep("sweep worker panicked".to_string())))
    }
}

/// Configurations for a linear sweep of one named parameter over an
/// inclusive range.
pub fn linear_sweep(
    base: &RunConfig,
    parameter: &str,
    range: (f64, f64),
    steps: usize,
) -> Result<Vec<RunConfig>> {
    if steps < 2 {
        return Err(Error::InvalidSweep(
            "linear sweep needs at least 2 steps".to_string(),
        ));
    }
    let (lo, hi) = range;
    if !(lo.is_finite() && hi.is_finite()) {
        return Err(Error::InvalidSweep("sweep range must be finite".to_string()));
    }

    // Validate the parameter name against the base model up front
    let model = crate::model::ModelKind::parse(&base.model)?;
    if !model.param_names().contains(&parameter) {
        return Err(Error::InvalidSweep(format!(
            "{parameter} is not a parameter of model {model}"
        )));
    }

    let configs = (0..steps)
        .map(|i| {
            let value = lo + (hi - lo) * i as f64 / (steps - 1) as f64;
            let mut config = base.clone();
            // Pin the full parameter set so one override never reverts the
            // rest to model defaults
            let mut params = if base.params.is_empty() {
                model
                    .param_names()
                    .iter()
                    .zip(default_values(&model))
                    .map(|(name, default)| ((*name).to_string(), default))
                    .collect()
            } else {
                base.params.clone()
            };
            params.insert(parameter.to_string(), value);
            config.params = params;
            config
        })
        .collect();
    Ok(configs)
}

fn default_values(model: &crate::model::ModelKind) -> Vec<f64> {
    use crate::model::ModelParams;
    match model.default_params() {
        ModelParams::Lorenz(p) => vec![p.sigma, p.rho, p.beta],
        ModelParams::Rossler(p) => vec![p.a, p.b, p.c],
        ModelParams::Chen(p) => vec![p.a, p.b, p.c],
    }
}

/// Configurations for an ensemble of runs with seeded random initial
/// conditions around the base config.
pub fn seeded_ensemble(
    base: &RunConfig,
    count: usize,
    scale: f64,
    seed: u64,
) -> Result<Vec<RunConfig>> {
    if count == 0 {
        return Err(Error::InvalidSweep("empty ensemble".to_string()));
    }
    let model = crate::model::ModelKind::parse(&base.model)?;
    let stream = rng::RngStream::new(seed);

    Ok((0..count)
        .map(|i| {
            let mut run_rng = stream.for_run(i as u64);
            let state: Vec<f64> = (0..model.dim()).map(|_| run_rng.normal() * scale).collect();
            RunConfig { initial_state: state, ..base.clone() }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn short_run() -> RunConfig {
        RunConfig { max_steps: Some(200), ..Default::default() }
    }

    #[test]
    fn test_sweep_validation() {
        assert!(matches!(
            SweepDriver::new(vec![], 4),
            Err(Error::InvalidSweep(_))
        ));
        assert!(matches!(
            SweepDriver::new(vec![short_run()], 0),
            Err(Error::InvalidSweep(_))
        ));
    }

    #[test]
    fn test_sweep_isolation_one_divergent_among_ten() {
        let mut configs = vec![short_run(); 9];
        let mut bad_params = IndexMap::new();
        bad_params.insert("sigma".to_string(), 10.0);
        bad_params.insert("rho".to_string(), 28.0);
        bad_params.insert("beta".to_string(), -8.0 / 3.0);
        configs.insert(
            4,
            RunConfig {
                params: bad_params,
                max_steps: Some(100_000),
                ..Default::default()
            },
        );

        let report = SweepDriver::new(configs, 4).unwrap().run().unwrap();

        assert_eq!(report.summary.completed, 9);
        assert_eq!(report.summary.diverged, 1);
        assert_eq!(report.entries.len(), 10);
        // Entry order is submission order; the bad run sits at index 4
        for (i, entry) in report.entries.iter().enumerate() {
            assert_eq!(entry.index, i);
            let status = entry.result.as_ref().unwrap().status;
            if i == 4 {
                assert_eq!(status, RunStatus::Diverged);
            } else {
                assert_eq!(status, RunStatus::Completed);
                // No cross-contamination: siblings keep default parameters
                assert!(entry.config.params.is_empty());
            }
        }
    }

    #[test]
    fn test_sweep_deterministic_across_runs() {
        let configs = linear_sweep(&short_run(), "rho", (20.0, 30.0), 6).unwrap();
        let a = SweepDriver::new(configs.clone(), 3).unwrap().run().unwrap();
        let b = SweepDriver::new(configs, 3).unwrap().run().unwrap();
        for (x, y) in a.entries.iter().zip(b.entries.iter()) {
            assert_eq!(
                x.result.as_ref().unwrap().trajectory,
                y.result.as_ref().unwrap().trajectory
            );
        }
    }

    #[test]
    fn test_invalid_config_counted_not_fatal() {
        let configs = vec![
            short_run(),
            RunConfig { model: "duffing".to_string(), ..short_run() },
        ];
        let report = SweepDriver::new(configs, 2).unwrap().run().unwrap();
        assert_eq!(report.summary.completed, 1);
        assert_eq!(report.summary.invalid, 1);
    }

    #[test]
    fn test_linear_sweep_endpoints_and_pinning() {
        let configs = linear_sweep(&short_run(), "rho", (20.0, 30.0), 5).unwrap();
        assert_eq!(configs.len(), 5);
        assert_eq!(configs[0].params["rho"], 20.0);
        assert_eq!(configs[4].params["rho"], 30.0);
        // Non-swept parameters pinned to defaults
        assert_eq!(configs[0].params["sigma"], 10.0);
        assert_eq!(configs[0].params["beta"], 8.0 / 3.0);
    }

    #[test]
    fn test_linear_sweep_rejects_unknown_parameter() {
        assert!(matches!(
            linear_sweep(&short_run(), "gamma", (0.0, 1.0), 4),
            Err(Error::InvalidSweep(_))
        ));
    }

    #[test]
    fn test_seeded_ensemble_reproducible() {
        let a = seeded_ensemble(&short_run(), 5, 1.0, 42).unwrap();
        let b = seeded_ensemble(&short_run(), 5, 1.0, 42).unwrap();
        assert_eq!(a, b);
        // Distinct runs get distinct initial conditions
        assert_ne!(a[0].initial_state, a[1].initial_state);
    }

    #[test]
    fn test_spawn_exposes_per_run_states_mid_flight() {
        use std::time::{Duration, Instant};

        // More runs than workers, each effectively unbounded, so at any
        // instant some runs are executing while others wait for a slot
        let configs = vec![
            RunConfig { max_steps: Some(u64::MAX / 2), ..Default::default() };
            4
        ];
        let handle = SweepDriver::new(configs, 2).unwrap().spawn();

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let states = handle.run_states();
            assert_eq!(states.len(), 4);
            let running = states.iter().filter(|s| **s == RunState::Running).count();
            let pending = states.iter().filter(|s| **s == RunState::Pending).count();
            if running > 0 && pending > 0 {
                break;
            }
            assert!(Instant::now() < deadline, "never observed a mixed state: {states:?}");
            std::thread::sleep(Duration::from_millis(5));
        }

        handle.cancel();
        let report = handle.join().unwrap();
        assert_eq!(report.summary.cancelled, 4);
    }

    #[test]
    fn test_spawn_marks_rejected_and_finished_runs() {
        let configs = vec![
            short_run(),
            RunConfig { model: "duffing".to_string(), ..short_run() },
        ];
        let handle = SweepDriver::new(configs, 2).unwrap().spawn();
        let report = handle.join().unwrap();

        assert_eq!(report.summary.completed, 1);
        assert_eq!(report.summary.invalid, 1);
        // join consumed the handle; final states live on in the report
        for entry in &report.entries {
            match entry.index {
                0 => assert_eq!(entry.result.as_ref().unwrap().status, RunStatus::Completed),
                _ => assert!(entry.result.is_err()),
            }
        }
    }

    #[test]
    fn test_spawn_final_states_match_report() {
        let configs = vec![
            short_run(),
            RunConfig { model: "duffing".to_string(), ..short_run() },
        ];
        let driver = SweepDriver::new(configs, 2).unwrap();
        let states = Arc::clone(&driver.states);
        let report = driver.run().unwrap();
        assert_eq!(report.entries.len(), 2);

        let states = states.lock().unwrap();
        assert_eq!(states[0], RunState::Finished(RunStatus::Completed));
        assert_eq!(states[1], RunState::Rejected);
    }

    #[test]
    fn test_sweep_cancellation_propagates() {
        let configs = vec![
            RunConfig { max_steps: Some(u64::MAX / 2), ..Default::default() };
            4
        ];
        let driver = SweepDriver::new(configs, 2).unwrap();
        let token = driver.cancel_token();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            token.cancel();
        });

        let report = driver.run().unwrap();
        canceller.join().unwrap();

        // Every run finalized as cancelled, none lost
        assert_eq!(report.entries.len(), 4);
        assert_eq!(report.summary.cancelled, 4);
        for entry in &report.entries {
            assert!(!entry.result.as_ref().unwrap().trajectory.is_empty());
        }
    }
}
