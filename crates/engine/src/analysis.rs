//! Trajectory and model analysis
//!
//! Pure functions over models and finished trajectories: equilibrium
//! points, Poincare sections, pairwise separation (sensitivity to initial
//! conditions) and Lyapunov exponents.

use crate::integrate::{self, Scheme};
use crate::model::{LorenzParams, ModelParams};
use crate::types::Trajectory;

/// Equilibrium points of the Lorenz system.
///
/// The origin always; for rho > 1 also the two symmetric points
/// `(+-sqrt(beta(rho-1)), +-sqrt(beta(rho-1)), rho-1)`.
pub fn lorenz_equilibria(params: &LorenzParams) -> Vec<[f64; 3]> {
    let mut points = vec![[0.0, 0.0, 0.0]];
    if params.rho > 1.0 {
        let r = (params.beta * (params.rho - 1.0)).sqrt();
        points.push([r, r, params.rho - 1.0]);
        points.push([-r, -r, params.rho - 1.0]);
    }
    points
}

/// Intersections of a trajectory with the plane `z = plane_offset`,
/// linearly interpolated between the bracketing samples.
///
/// Both crossing directions are reported. The conventional Lorenz section
/// plane is `z = rho - 1 = 27` for classical parameters.
pub fn poincare_section(trajectory: &Trajectory, plane_offset: f64) -> Vec<[f64; 3]> {
    let samples = trajectory.samples();
    let mut crossings = Vec::new();

    for pair in samples.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let (za, zb) = (a.state[2] - plane_offset, b.state[2] - plane_offset);
        if za == 0.0 {
            crossings.push([a.state[0], a.state[1], plane_offset]);
            continue;
        }
        if za * zb < 0.0 {
            let alpha = za / (za - zb);
            crossings.push([
                a.state[0] + alpha * (b.state[0] - a.state[0]),
                a.state[1] + alpha * (b.state[1] - a.state[1]),
                plane_offset,
            ]);
        }
    }
    crossings
}

/// Pointwise Euclidean distance between two trajectories, over the common
/// sample prefix. For chaotic parameters and nearby initial conditions the
/// separation grows until it saturates at attractor size.
pub fn separation(a: &Trajectory, b: &Trajectory) -> Vec<(f64, f64)> {
    a.iter()
        .zip(b.iter())
        .map(|(sa, sb)| {
            let dist = sa
                .state
                .iter()
                .zip(sb.state.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt();
            (sa.t, dist)
        })
        .collect()
}

/// Lyapunov exponents via the Benettin tangent-space method.
///
/// Advances the state with RK4 and an orthonormal tangent frame with the
/// model Jacobian, re-orthonormalizing by modified Gram-Schmidt each step
/// and accumulating the log norms. Returns `dim` exponents, sorted
/// descending. `transient_steps` are integrated first without accumulating.
pub fn lyapunov_exponents(
    params: &ModelParams,
    initial_state: &[f64],
    dt: f64,
    steps: u64,
    transient_steps: u64,
) -> Vec<f64> {
    let n = params.dim();
    let f = |_t: f64, y: &[f64], out: &mut [f64]| params.derivative(y, out);

    let mut state = initial_state.to_vec();
    let mut t = 0.0;
    for _ in 0..transient_steps {
        state = integrate::step(Scheme::Rk4, &f, t, &state, dt).state;
        t += dt;
    }

    // Identity tangent frame, column vectors
    let mut frame: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    let mut sums = vec![0.0; n];

    for _ in 0..steps {
        let jac = params.jacobian(&state);
        state = integrate::step(Scheme::Rk4, &f, t, &state, dt).state;
        t += dt;

        // Tangent vectors evolve under the linearized flow: v += dt * J v
        for v in frame.iter_mut() {
            let mut jv = vec![0.0; n];
            for (i, jv_i) in jv.iter_mut().enumerate() {
                for (j, vj) in v.iter().enumerate() {
                    *jv_i += jac[i][j] * vj;
                }
            }
            for (vi, d) in v.iter_mut().zip(jv.iter()) {
                *vi += dt * d;
            }
        }

        // Modified Gram-Schmidt; the shrink/stretch of each orthogonalized
        // vector is one step's contribution to its exponent
        for k in 0..n {
            for j in 0..k {
                let proj: f64 = frame[k]
                    .iter()
                    .zip(frame[j].iter())
                    .map(|(a, b)| a * b)
                    .sum();
                let prev = frame[j].clone();
                for (vk, pj) in frame[k].iter_mut().zip(prev.iter()) {
                    *vk -= proj * pj;
                }
            }
            let norm = frame[k].iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                for v in frame[k].iter_mut() {
                    *v /= norm;
                }
                sums[k] += norm.ln();
            }
        }
    }

    let horizon = steps as f64 * dt;
    let mut exponents: Vec<f64> = sums.iter().map(|s| s / horizon).collect();
    exponents.sort_by(|a, b| b.total_cmp(a));
    exponents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::engine;
    use crate::types::{Sample, Trajectory};

    #[test]
    fn test_equilibria_subcritical() {
        let points = lorenz_equilibria(&LorenzParams::fixed_point());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_equilibria_supercritical() {
        let params = LorenzParams::classical();
        let points = lorenz_equilibria(&params);
        assert_eq!(points.len(), 3);

        let r = (params.beta * (params.rho - 1.0)).sqrt();
        assert!((points[1][0] - r).abs() < 1e-10);
        assert!((points[1][2] - 27.0).abs() < 1e-10);
        assert!((points[2][0] + r).abs() < 1e-10);
    }

    fn trajectory_of(states: &[[f64; 3]]) -> Trajectory {
        let mut traj = Trajectory::new();
        for (i, s) in states.iter().enumerate() {
            traj.push(Sample::new(i as f64, s.to_vec()));
        }
        traj
    }

    #[test]
    fn test_poincare_no_crossings() {
        let traj = trajectory_of(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]);
        assert!(poincare_section(&traj, 27.0).is_empty());
    }

    #[test]
    fn test_poincare_two_crossings() {
        let traj = trajectory_of(&[[0.0, 0.0, 26.0], [1.0, 1.0, 28.0], [2.0, 2.0, 26.0]]);
        let crossings = poincare_section(&traj, 27.0);
        assert_eq!(crossings.len(), 2);
        for c in &crossings {
            assert!((c[2] - 27.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_separation_grows_for_chaotic_lorenz() {
        let base = RunConfig { max_steps: Some(2000), ..Default::default() };
        let shifted = RunConfig {
            initial_state: vec![1.01, 1.0, 1.0],
            ..base.clone()
        };
        let a = engine::run(&base).unwrap();
        let b = engine::run(&shifted).unwrap();

        let sep = separation(&a.trajectory, &b.trajectory);
        assert_eq!(sep.len(), 2001);
        assert!(sep[0].1 < 0.02);
        // After 20 time units the orbits have decorrelated
        let late_max = sep[1500..].iter().map(|(_, d)| *d).fold(0.0, f64::max);
        assert!(late_max > 1.0, "late separation {late_max}");
    }

    #[test]
    fn test_lyapunov_spectrum_signature() {
        let params = ModelParams::Lorenz(LorenzParams::classical());
        let exponents = lyapunov_exponents(&params, &[1.0, 1.0, 1.0], 0.01, 5000, 500);

        assert_eq!(exponents.len(), 3);
        // Chaotic Lorenz: one positive, one near zero, one negative;
        // dissipative, so the sum is negative
        assert!(exponents[0] > 0.0, "largest {}", exponents[0]);
        assert!(exponents[2] < 0.0, "smallest {}", exponents[2]);
        assert!(exponents.iter().sum::<f64>() < 0.0);
    }
}
