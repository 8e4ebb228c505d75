//! Step integrators
//!
//! One-step advancement of an ODE state under a closed set of schemes.
//! The steppers are generic over the right-hand side so the numeric kernels
//! stay independent of the model layer; the engine passes the model's
//! derivative in.
//!
//! The adaptive scheme is the Dormand-Prince 5(4) embedded pair; its error
//! estimate feeds the standard accept/reject controller in [`StepController`].

use serde::{Deserialize, Serialize};

/// Integration schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// First-order explicit Euler; fixed step
    Euler,
    /// Classical fourth-order Runge-Kutta; fixed step
    Rk4,
    /// Dormand-Prince 5(4) embedded pair; adaptive step
    DormandPrince,
}

impl Scheme {
    /// Resolve a scheme tag. `rk45` is accepted as the conventional alias
    /// for the Dormand-Prince pair.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "euler" => Some(Scheme::Euler),
            "rk4" => Some(Scheme::Rk4),
            "dormand_prince" | "rk45" => Some(Scheme::DormandPrince),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Euler => "euler",
            Scheme::Rk4 => "rk4",
            Scheme::DormandPrince => "dormand_prince",
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Scheme::DormandPrince)
    }
}

/// Result of one trial step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Proposed state at `t + dt`
    pub state: Vec<f64>,
    /// Scaled local error estimate; `None` for fixed-step schemes
    pub error: Option<f64>,
}

/// Advance `state` by one step of `dt` under `scheme`.
///
/// `f(t, y, dydt)` evaluates the right-hand side. The proposed state is
/// returned as-is even if non-finite; the caller decides whether that is a
/// divergence.
pub fn step<F>(scheme: Scheme, f: &F, t: f64, state: &[f64], dt: f64) -> StepOutcome
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    match scheme {
        Scheme::Euler => euler_step(f, t, state, dt),
        Scheme::Rk4 => rk4_step(f, t, state, dt),
        Scheme::DormandPrince => dopri_step(f, t, state, dt),
    }
}

fn euler_step<F>(f: &F, t: f64, y: &[f64], dt: f64) -> StepOutcome
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    let n = y.len();
    let mut k = vec![0.0; n];
    f(t, y, &mut k);

    let state = (0..n).map(|i| y[i] + dt * k[i]).collect();
    StepOutcome { state, error: None }
}

fn rk4_step<F>(f: &F, t: f64, y: &[f64], dt: f64) -> StepOutcome
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    let n = y.len();
    let mut k1 = vec![0.0; n];
    let mut k2 = vec![0.0; n];
    let mut k3 = vec![0.0; n];
    let mut k4 = vec![0.0; n];
    let mut tmp = vec![0.0; n];

    f(t, y, &mut k1);

    for i in 0..n {
        tmp[i] = y[i] + 0.5 * dt * k1[i];
    }
    f(t + 0.5 * dt, &tmp, &mut k2);

    for i in 0..n {
        tmp[i] = y[i] + 0.5 * dt * k2[i];
    }
    f(t + 0.5 * dt, &tmp, &mut k3);

    for i in 0..n {
        tmp[i] = y[i] + dt * k3[i];
    }
    f(t + dt, &tmp, &mut k4);

    let state = (0..n)
        .map(|i| y[i] + dt / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
        .collect();
    StepOutcome { state, error: None }
}

// Dormand-Prince 5(4) Butcher tableau
const DP_C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const DP_A: [[f64; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
];
/// 5th-order solution weights
const DP_B5: [f64; 7] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
    0.0,
];
/// Embedded 4th-order weights
const DP_B4: [f64; 7] = [
    5179.0 / 57600.0,
    0.0,
    7571.0 / 16695.0,
    393.0 / 640.0,
    -92097.0 / 339200.0,
    187.0 / 2100.0,
    1.0 / 40.0,
];

fn dopri_step<F>(f: &F, t: f64, y: &[f64], dt: f64) -> StepOutcome
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    let n = y.len();
    let mut k = vec![vec![0.0; n]; 7];
    let mut tmp = vec![0.0; n];

    f(t, y, &mut k[0]);
    for stage in 1..7 {
        for i in 0..n {
            let mut acc = 0.0;
            for (j, kj) in k.iter().enumerate().take(stage) {
                acc += DP_A[stage][j] * kj[i];
            }
            tmp[i] = y[i] + dt * acc;
        }
        let (_, rest) = k.split_at_mut(stage);
        f(t + DP_C[stage] * dt, &tmp, &mut rest[0]);
    }

    let mut state = vec![0.0; n];
    let mut err_sq = 0.0;
    for i in 0..n {
        let mut y5 = 0.0;
        let mut y4 = 0.0;
        for (j, kj) in k.iter().enumerate() {
            y5 += DP_B5[j] * kj[i];
            y4 += DP_B4[j] * kj[i];
        }
        let y5 = y[i] + dt * y5;
        let y4 = y[i] + dt * y4;
        state[i] = y5;

        // Error relative to solution magnitude, so one tolerance knob covers
        // both small and large states
        let scale = 1.0 + y[i].abs().max(y5.abs());
        let e = (y5 - y4) / scale;
        err_sq += e * e;
    }
    let error = (err_sq / n as f64).sqrt();

    StepOutcome { state, error: Some(error) }
}

/// Accept/reject controller for the embedded pair.
///
/// A step is accepted when its scaled error estimate is at or below the
/// tolerance. The next step size follows
/// `dt * clamp(safety * (tol/err)^(1/5), shrink_min, grow_max)`, clamped
/// into `[dt_min, dt_max]`.
#[derive(Debug, Clone, Copy)]
pub struct StepController {
    pub tolerance: f64,
    pub dt_min: f64,
    pub dt_max: f64,
    pub safety: f64,
    pub shrink_min: f64,
    pub grow_max: f64,
}

impl StepController {
    pub fn new(tolerance: f64, dt_min: f64, dt_max: f64) -> Self {
        Self {
            tolerance,
            dt_min,
            dt_max,
            safety: 0.9,
            shrink_min: 0.2,
            grow_max: 5.0,
        }
    }

    pub fn accepts(&self, error: f64) -> bool {
        error <= self.tolerance
    }

    /// Next step size after observing `error` on a step of `dt`.
    ///
    /// Exponent 1/5 = 1/(p+1) for the embedded order p = 4.
    pub fn rescale(&self, dt: f64, error: f64) -> f64 {
        let factor = if error > 0.0 {
            (self.safety * (self.tolerance / error).powf(0.2))
                .clamp(self.shrink_min, self.grow_max)
        } else {
            // Error estimate of exactly zero: grow as much as allowed
            self.grow_max
        };
        (dt * factor).clamp(self.dt_min, self.dt_max)
    }

    /// Whether a rejected step can still be retried with a smaller `dt`.
    pub fn can_shrink(&self, dt: f64) -> bool {
        dt > self.dt_min
    }
}
