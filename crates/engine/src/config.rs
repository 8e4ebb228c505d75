//! Run configuration
//!
//! A [`RunConfig`] is the externally-facing description of one run. All
//! validation happens once, up front, in [`RunConfig::resolve`]; the engine
//! only ever sees a fully-checked [`ResolvedRun`]. Invalid input is never
//! silently defaulted.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::integrate::Scheme;
use crate::model::{ModelKind, ModelParams};

/// Default time step, matching the conventional Lorenz setup.
pub const DEFAULT_DT: f64 = 0.01;
/// Default step count when no horizon is given explicitly.
pub const DEFAULT_MAX_STEPS: u64 = 10_000;
/// Default adaptive tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;
/// Default adaptive step-size bounds.
pub const DEFAULT_DT_MIN: f64 = 1e-10;
pub const DEFAULT_DT_MAX: f64 = 1.0;

/// Description of one integration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Model tag, e.g. `"lorenz"`
    pub model: String,
    /// Named coefficients; empty selects the model defaults
    #[serde(default)]
    pub params: IndexMap<String, f64>,
    /// Initial phase-space position
    pub initial_state: Vec<f64>,
    #[serde(default = "default_scheme")]
    pub scheme: Scheme,
    /// Initial (fixed schemes: constant) time step
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Adaptive local error tolerance
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Start time
    #[serde(default)]
    pub t0: f64,
    /// Time horizon; mutually exclusive with `max_steps`
    #[serde(default)]
    pub t_end: Option<f64>,
    /// Step-count horizon; mutually exclusive with `t_end`
    #[serde(default)]
    pub max_steps: Option<u64>,
    /// Uniform output grid interval; `None` emits every accepted step
    #[serde(default)]
    pub output_interval: Option<f64>,
    /// Trajectory buffer capacity; `None` is unbounded
    #[serde(default)]
    pub max_buffer_size: Option<usize>,
    #[serde(default = "default_dt_min")]
    pub dt_min: f64,
    #[serde(default = "default_dt_max")]
    pub dt_max: f64,
}

fn default_scheme() -> Scheme {
    Scheme::Rk4
}
fn default_dt() -> f64 {
    DEFAULT_DT
}
fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}
fn default_dt_min() -> f64 {
    DEFAULT_DT_MIN
}
fn default_dt_max() -> f64 {
    DEFAULT_DT_MAX
}

impl Default for RunConfig {
    /// Classical Lorenz run: rk4, dt 0.01, 10,000 steps from (1, 1, 1).
    fn default() -> Self {
        Self {
            model: "lorenz".to_string(),
            params: IndexMap::new(),
            initial_state: vec![1.0, 1.0, 1.0],
            scheme: Scheme::Rk4,
            dt: DEFAULT_DT,
            tolerance: DEFAULT_TOLERANCE,
            t0: 0.0,
            t_end: None,
            max_steps: Some(DEFAULT_MAX_STEPS),
            output_interval: None,
            max_buffer_size: None,
            dt_min: DEFAULT_DT_MIN,
            dt_max: DEFAULT_DT_MAX,
        }
    }
}

/// Integration horizon, after validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Horizon {
    /// Integrate until this time
    Time(f64),
    /// Take exactly this many accepted steps
    Steps(u64),
}

/// A fully validated run, ready to execute.
#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub model: ModelKind,
    pub params: ModelParams,
    pub initial_state: Vec<f64>,
    pub scheme: Scheme,
    pub dt: f64,
    pub tolerance: f64,
    pub t0: f64,
    pub horizon: Horizon,
    pub output_interval: Option<f64>,
    pub max_buffer_size: Option<usize>,
    pub dt_min: f64,
    pub dt_max: f64,
}

impl RunConfig {
    /// Validate every field and resolve tags into their closed variant sets.
    pub fn resolve(&self) -> Result<ResolvedRun> {
        let model = ModelKind::parse(&self.model)?;
        let params = model.resolve_params(&self.params)?;

        if self.initial_state.len() != model.dim() {
            return Err(Error::DimensionMismatch {
                expected: model.dim(),
                actual: self.initial_state.len(),
            });
        }
        if self.initial_state.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfig(
                "initial state must be finite".to_string(),
            ));
        }

        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        if !self.t0.is_finite() {
            return Err(Error::InvalidConfig("t0 must be finite".to_string()));
        }

        let horizon = match (self.t_end, self.max_steps) {
            (Some(t_end), None) => {
                if !(t_end.is_finite() && t_end > self.t0) {
                    return Err(Error::InvalidConfig(format!(
                        "t_end must be finite and greater than t0, got {t_end}"
                    )));
                }
                Horizon::Time(t_end)
            }
            (None, Some(steps)) => {
                if steps == 0 {
                    return Err(Error::InvalidConfig(
                        "max_steps must be positive".to_string(),
                    ));
                }
                Horizon::Steps(steps)
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidConfig(
                    "set either t_end or max_steps, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "one of t_end or max_steps is required".to_string(),
                ));
            }
        };

        if self.scheme.is_adaptive() {
            if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "tolerance must be positive, got {}",
                    self.tolerance
                )));
            }
            if !(self.dt_min > 0.0 && self.dt_min <= self.dt_max) {
                return Err(Error::InvalidConfig(format!(
                    "step-size bounds must satisfy 0 < dt_min <= dt_max, got [{}, {}]",
                    self.dt_min, self.dt_max
                )));
            }
        }

        if let Some(interval) = self.output_interval
            && !(interval.is_finite() && interval > 0.0)
        {
            return Err(Error::InvalidConfig(format!(
                "output_interval must be positive, got {interval}"
            )));
        }
        if self.max_buffer_size == Some(0) {
            return Err(Error::InvalidConfig(
                "max_buffer_size must be positive".to_string(),
            ));
        }

        Ok(ResolvedRun {
            model,
            params,
            initial_state: self.initial_state.clone(),
            scheme: self.scheme,
            dt: self.dt,
            tolerance: self.tolerance,
            t0: self.t0,
            horizon,
            output_interval: self.output_interval,
            max_buffer_size: self.max_buffer_size,
            dt_min: self.dt_min,
            dt_max: self.dt_max,
        })
    }
}
