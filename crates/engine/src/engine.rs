//! Trajectory engine
//!
//! Drives a step integrator from an initial state to a requested horizon,
//! streaming every emitted sample into a [`SharedBuffer`] as it is produced.
//! The step loop is inherently sequential; parallelism lives one level up,
//! in the sweep driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, error, info, instrument, trace};

use crate::buffer::{Cursor, SharedBuffer};
use crate::config::{Horizon, ResolvedRun, RunConfig};
use crate::error::Result;
use crate::integrate::{self, Scheme, StepController};
use crate::types::{RunOutcome, RunStatus, Sample, Trajectory};

/// Cooperative cancellation signal, checked between steps, never mid-step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Run a configuration to completion, synchronously.
///
/// Configuration errors surface immediately; run failures (divergence,
/// step-size underflow) come back as the outcome's status with the partial
/// trajectory preserved.
pub fn run(config: &RunConfig) -> Result<RunOutcome> {
    let resolved = config.resolve()?;
    let buffer = SharedBuffer::new(resolved.max_buffer_size);
    Ok(execute(&resolved, &buffer, &CancelToken::new()))
}

/// Start a run on a worker thread and return a streaming handle.
///
/// Configuration errors still surface synchronously, before any thread is
/// spawned.
pub fn spawn(config: &RunConfig) -> Result<RunHandle> {
    let resolved = config.resolve()?;
    let buffer = SharedBuffer::new(resolved.max_buffer_size);
    let cancel = CancelToken::new();

    let worker_buffer = buffer.clone();
    let worker_cancel = cancel.clone();
    let (status_tx, status_rx) = mpsc::channel();
    let join = thread::spawn(move || {
        let outcome = execute(&resolved, &worker_buffer, &worker_cancel);
        // Receiver dropping just means nobody is polling status
        let _ = status_tx.send(outcome.status);
        outcome
    });

    Ok(RunHandle {
        buffer,
        cancel,
        status_rx,
        finished: None,
        join: Some(join),
    })
}

/// Handle to a run executing on a worker thread.
pub struct RunHandle {
    buffer: SharedBuffer,
    cancel: CancelToken,
    status_rx: mpsc::Receiver<RunStatus>,
    finished: Option<RunStatus>,
    join: Option<thread::JoinHandle<RunOutcome>>,
}

impl RunHandle {
    /// Samples produced since `cursor`; non-blocking.
    pub fn drain_since(&self, cursor: Cursor) -> (Vec<Sample>, Cursor) {
        self.buffer.drain_since(cursor)
    }

    /// Everything retained so far.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer.snapshot()
    }

    /// The underlying stream, for consumers that want blocking drains.
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Terminal status, or `None` while the run is still live.
    pub fn status(&mut self) -> Option<RunStatus> {
        if self.finished.is_none()
            && let Ok(status) = self.status_rx.try_recv()
        {
            self.finished = Some(status);
        }
        self.finished
    }

    /// Wait for the run to finalize and take its outcome.
    pub fn join(mut self) -> RunOutcome {
        let join = self.join.take().expect("run already joined");
        join.join().expect("run worker panicked")
    }
}

/// Execute a resolved run, pushing each emitted sample into `buffer`.
///
/// Used directly by the sweep driver so sibling runs can share one cancel
/// token while keeping private buffers.
#[instrument(skip_all, name = "run", fields(model = %resolved.model, scheme = resolved.scheme.name()))]
pub fn execute(resolved: &ResolvedRun, buffer: &SharedBuffer, cancel: &CancelToken) -> RunOutcome {
    info!(
        dt = resolved.dt,
        horizon = ?resolved.horizon,
        "run started"
    );

    let outcome = if resolved.scheme.is_adaptive() {
        execute_adaptive(resolved, buffer, cancel)
    } else {
        execute_fixed(resolved, buffer, cancel)
    };

    buffer.close();
    info!(
        status = %outcome.status,
        samples = outcome.trajectory.len(),
        steps = outcome.accepted_steps,
        final_t = outcome.final_t,
        "run finalized"
    );
    outcome
}

/// Emits samples either per accepted step or re-gridded onto a uniform
/// time grid by linear interpolation, decoupling the numeric step size
/// from the reporting cadence.
struct Emitter {
    interval: Option<f64>,
    next_t: f64,
}

impl Emitter {
    fn new(interval: Option<f64>, t0: f64) -> Self {
        Self {
            interval,
            next_t: t0 + interval.unwrap_or(0.0),
        }
    }

    fn on_accepted(
        &mut self,
        prev_t: f64,
        prev_state: &[f64],
        t: f64,
        state: &[f64],
        trajectory: &mut Trajectory,
        buffer: &SharedBuffer,
    ) {
        match self.interval {
            None => emit(trajectory, buffer, Sample::new(t, state.to_vec())),
            Some(interval) => {
                let eps = interval * 1e-9;
                while self.next_t <= t + eps {
                    let alpha = (self.next_t - prev_t) / (t - prev_t);
                    let interp: Vec<f64> = prev_state
                        .iter()
                        .zip(state.iter())
                        .map(|(a, b)| a + alpha * (b - a))
                        .collect();
                    emit(trajectory, buffer, Sample::new(self.next_t, interp));
                    self.next_t += interval;
                }
            }
        }
    }
}

fn emit(trajectory: &mut Trajectory, buffer: &SharedBuffer, sample: Sample) {
    buffer.push(sample.clone());
    trajectory.push(sample);
}

fn is_finite(state: &[f64]) -> bool {
    state.iter().all(|v| v.is_finite())
}

fn execute_fixed(
    resolved: &ResolvedRun,
    buffer: &SharedBuffer,
    cancel: &CancelToken,
) -> RunOutcome {
    let params = resolved.params;
    let f = move |_t: f64, y: &[f64], out: &mut [f64]| params.derivative(y, out);

    let mut trajectory = Trajectory::new();
    let mut emitter = Emitter::new(resolved.output_interval, resolved.t0);
    let mut t = resolved.t0;
    let mut state = resolved.initial_state.clone();
    let mut accepted: u64 = 0;

    emit(&mut trajectory, buffer, Sample::new(t, state.clone()));

    let mut status = RunStatus::Completed;
    loop {
        let dt = match resolved.horizon {
            Horizon::Steps(max) => {
                if accepted >= max {
                    break;
                }
                resolved.dt
            }
            Horizon::Time(t_end) => {
                let remaining = t_end - t;
                if remaining <= time_eps(t_end) {
                    break;
                }
                // Truncate the final step to land exactly on the horizon
                resolved.dt.min(remaining)
            }
        };

        if cancel.is_cancelled() {
            debug!(t, accepted, "run cancelled");
            status = RunStatus::Cancelled;
            break;
        }

        let out = integrate::step(resolved.scheme, &f, t, &state, dt);
        if !is_finite(&out.state) {
            error!(t, accepted, "non-finite state; run diverged");
            status = RunStatus::Diverged;
            break;
        }

        let t_new = t + dt;
        emitter.on_accepted(t, &state, t_new, &out.state, &mut trajectory, buffer);
        state = out.state;
        t = t_new;
        accepted += 1;
        trace!(t, accepted, "step accepted");
    }

    RunOutcome { trajectory, status, accepted_steps: accepted, final_t: t }
}

fn execute_adaptive(
    resolved: &ResolvedRun,
    buffer: &SharedBuffer,
    cancel: &CancelToken,
) -> RunOutcome {
    let params = resolved.params;
    let f = move |_t: f64, y: &[f64], out: &mut [f64]| params.derivative(y, out);
    let ctl = StepController::new(resolved.tolerance, resolved.dt_min, resolved.dt_max);

    let mut trajectory = Trajectory::new();
    let mut emitter = Emitter::new(resolved.output_interval, resolved.t0);
    let mut t = resolved.t0;
    let mut state = resolved.initial_state.clone();
    let mut dt = resolved.dt.clamp(resolved.dt_min, resolved.dt_max);
    let mut accepted: u64 = 0;

    emit(&mut trajectory, buffer, Sample::new(t, state.clone()));

    let mut status = RunStatus::Completed;
    loop {
        let h = match resolved.horizon {
            Horizon::Steps(max) => {
                if accepted >= max {
                    break;
                }
                dt
            }
            Horizon::Time(t_end) => {
                let remaining = t_end - t;
                if remaining <= time_eps(t_end) {
                    break;
                }
                dt.min(remaining)
            }
        };

        if cancel.is_cancelled() {
            debug!(t, accepted, "run cancelled");
            status = RunStatus::Cancelled;
            break;
        }

        let out = integrate::step(Scheme::DormandPrince, &f, t, &state, h);
        let err = out.error.unwrap_or(0.0);

        if !is_finite(&out.state) || !err.is_finite() {
            error!(t, accepted, "non-finite state; run diverged");
            status = RunStatus::Diverged;
            break;
        }

        if ctl.accepts(err) {
            let t_new = t + h;
            emitter.on_accepted(t, &state, t_new, &out.state, &mut trajectory, buffer);
            state = out.state;
            t = t_new;
            accepted += 1;
            dt = ctl.rescale(h, err);
            trace!(t, err, dt, "step accepted");
        } else {
            // Judge underflow on the controller's step, not a trial step
            // truncated to the remaining horizon
            if !ctl.can_shrink(dt) {
                error!(t, err, dt, "tolerance unreachable at dt_min");
                status = RunStatus::StepSizeUnderflow;
                break;
            }
            dt = ctl.rescale(h, err);
            trace!(t, err, dt, "step rejected");
        }
    }

    RunOutcome { trajectory, status, accepted_steps: accepted, final_t: t }
}

/// Comparison slack for horizon checks, scaled to the horizon magnitude.
fn time_eps(t_end: f64) -> f64 {
    1e-12 * t_end.abs().max(1.0)
}
