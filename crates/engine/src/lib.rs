//! Attractor Engine
//!
//! Numerical integration of chaotic dynamical systems (Lorenz and
//! structurally similar models), with streaming trajectory buffers and
//! parallel parameter sweeps. Visualization and export collaborators
//! consume trajectories through the buffer's pull-based drain contract.

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod integrate;
pub mod model;
pub mod rng;
pub mod sweep;
pub mod types;

pub use buffer::{Cursor, SharedBuffer, TrajectoryBuffer};
pub use config::{Horizon, ResolvedRun, RunConfig};
pub use engine::{CancelToken, RunHandle, run, spawn};
pub use error::{Error, Result};
pub use integrate::Scheme;
pub use model::{ChenParams, LorenzParams, ModelKind, ModelParams, RosslerParams};
pub use sweep::{
    RunState, SweepDriver, SweepEntry, SweepHandle, SweepReport, SweepSummary, linear_sweep,
    seeded_ensemble,
};
pub use types::{RunOutcome, RunStatus, Sample, Trajectory};
