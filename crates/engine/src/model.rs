//! System models
//!
//! The supported chaotic systems form a closed set, resolved from a name tag
//! once at configuration time. Each model defines its dimension, its named
//! parameter set and its ODE right-hand side.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported system models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Lorenz,
    Rossler,
    Chen,
}

impl ModelKind {
    /// Resolve a model tag. Unknown tags are a configuration error.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "lorenz" => Ok(ModelKind::Lorenz),
            "rossler" => Ok(ModelKind::Rossler),
            "chen" => Ok(ModelKind::Chen),
            other => Err(Error::UnknownModel(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Lorenz => "lorenz",
            ModelKind::Rossler => "rossler",
            ModelKind::Chen => "chen",
        }
    }

    /// Phase-space dimension
    pub fn dim(&self) -> usize {
        3
    }

    /// Parameter names, in canonical order
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            ModelKind::Lorenz => &["sigma", "rho", "beta"],
            ModelKind::Rossler | ModelKind::Chen => &["a", "b", "c"],
        }
    }

    /// Canonical default parameters
    pub fn default_params(&self) -> ModelParams {
        match self {
            ModelKind::Lorenz => ModelParams::Lorenz(LorenzParams::classical()),
            ModelKind::Rossler => ModelParams::Rossler(RosslerParams::default()),
            ModelKind::Chen => ModelParams::Chen(ChenParams::default()),
        }
    }

    /// Validate a named parameter map into typed parameters.
    ///
    /// An empty map selects the model defaults. Otherwise the map must name
    /// exactly this model's parameters, all finite.
    pub fn resolve_params(&self, map: &IndexMap<String, f64>) -> Result<ModelParams> {
        if map.is_empty() {
            return Ok(self.default_params());
        }

        for name in map.keys() {
            if !self.param_names().contains(&name.as_str()) {
                return Err(Error::InvalidParameter {
                    name: name.clone(),
                    message: format!("not a parameter of model {}", self.name()),
                });
            }
        }

        let get = |name: &str| -> Result<f64> {
            let value = *map.get(name).ok_or_else(|| Error::MissingParameter {
                model: self.name().to_string(),
                name: name.to_string(),
            })?;
            if !value.is_finite() {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    message: format!("must be finite, got {value}"),
                });
            }
            Ok(value)
        };

        match self {
            ModelKind::Lorenz => Ok(ModelParams::Lorenz(LorenzParams {
                sigma: get("sigma")?,
                rho: get("rho")?,
                beta: get("beta")?,
            })),
            ModelKind::Rossler => Ok(ModelParams::Rossler(RosslerParams {
                a: get("a")?,
                b: get("b")?,
                c: get("c")?,
            })),
            ModelKind::Chen => Ok(ModelParams::Chen(ChenParams {
                a: get("a")?,
                b: get("b")?,
                c: get("c")?,
            })),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lorenz system coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LorenzParams {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
}

impl LorenzParams {
    /// Classical chaotic regime
    pub fn classical() -> Self {
        Self { sigma: 10.0, rho: 28.0, beta: 8.0 / 3.0 }
    }

    /// Periodic regime (rho below the chaotic threshold)
    pub fn periodic() -> Self {
        Self { rho: 24.0, ..Self::classical() }
    }

    /// Subcritical regime; trajectories decay to the origin
    pub fn fixed_point() -> Self {
        Self { rho: 0.5, ..Self::classical() }
    }
}

/// Rossler system coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RosslerParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for RosslerParams {
    fn default() -> Self {
        Self { a: 0.2, b: 0.2, c: 5.7 }
    }
}

/// Chen system coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChenParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for ChenParams {
    fn default() -> Self {
        Self { a: 35.0, b: 3.0, c: 28.0 }
    }
}

/// Typed, validated parameters for one model.
///
/// Immutable for the lifetime of a run; freely shareable across threads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModelParams {
    Lorenz(LorenzParams),
    Rossler(RosslerParams),
    Chen(ChenParams),
}

impl ModelParams {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParams::Lorenz(_) => ModelKind::Lorenz,
            ModelParams::Rossler(_) => ModelKind::Rossler,
            ModelParams::Chen(_) => ModelKind::Chen,
        }
    }

    pub fn dim(&self) -> usize {
        self.kind().dim()
    }

    /// ODE right-hand side: write d/dt of `state` into `out`.
    ///
    /// Pure and deterministic. Finite input produces finite output for
    /// in-range states; blow-up manifests as growing magnitudes, which the
    /// engine detects as divergence.
    #[inline]
    pub fn derivative(&self, state: &[f64], out: &mut [f64]) {
        match self {
            ModelParams::Lorenz(p) => {
                let (x, y, z) = (state[0], state[1], state[2]);
                out[0] = p.sigma * (y - x);
                out[1] = x * (p.rho - z) - y;
                out[2] = x * y - p.beta * z;
            }
            ModelParams::Rossler(p) => {
                let (x, y, z) = (state[0], state[1], state[2]);
                out[0] = -y - z;
                out[1] = x + p.a * y;
                out[2] = p.b + z * (x - p.c);
            }
            ModelParams::Chen(p) => {
                let (x, y, z) = (state[0], state[1], state[2]);
                out[0] = p.a * (y - x);
                out[1] = (p.c - p.a) * x - x * z + p.c * y;
                out[2] = x * y - p.b * z;
            }
        }
    }

    /// Jacobian of the right-hand side at `state`.
    #[inline]
    pub fn jacobian(&self, state: &[f64]) -> [[f64; 3]; 3] {
        let (x, y, z) = (state[0], state[1], state[2]);
        match self {
            ModelParams::Lorenz(p) => [
                [-p.sigma, p.sigma, 0.0],
                [p.rho - z, -1.0, -x],
                [y, x, -p.beta],
            ],
            ModelParams::Rossler(p) => [
                [0.0, -1.0, -1.0],
                [1.0, p.a, 0.0],
                [z, 0.0, x - p.c],
            ],
            ModelParams::Chen(p) => [
                [-p.a, p.a, 0.0],
                [p.c - p.a - z, p.c, -x],
                [y, x, -p.b],
            ],
        }
    }
}
