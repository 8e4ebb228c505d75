//! End-to-end engine properties.

use attractor_engine::{
    ModelKind, RunConfig, RunStatus, Scheme, SweepDriver, linear_sweep, run,
};

fn lorenz(max_steps: u64) -> RunConfig {
    RunConfig { max_steps: Some(max_steps), ..Default::default() }
}

#[test]
fn trajectories_have_model_dimension_and_increasing_times() {
    for scheme in [Scheme::Euler, Scheme::Rk4, Scheme::DormandPrince] {
        let config = RunConfig {
            scheme,
            t_end: Some(3.0),
            max_steps: None,
            ..Default::default()
        };
        let outcome = run(&config).unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);

        let dim = ModelKind::Lorenz.dim();
        let samples = outcome.trajectory.samples();
        assert!(!samples.is_empty());
        for sample in samples {
            assert_eq!(sample.state.len(), dim);
        }
        for pair in samples.windows(2) {
            assert!(pair[1].t > pair[0].t);
        }
    }
}

#[test]
fn fixed_scheme_is_bit_deterministic() {
    let a = run(&lorenz(5_000)).unwrap();
    let b = run(&lorenz(5_000)).unwrap();
    assert_eq!(a.trajectory, b.trajectory);
    assert_eq!(a.accepted_steps, b.accepted_steps);
}

#[test]
fn adaptive_scheme_is_deterministic_too() {
    let config = RunConfig {
        scheme: Scheme::DormandPrince,
        t_end: Some(10.0),
        max_steps: None,
        ..Default::default()
    };
    let a = run(&config).unwrap();
    let b = run(&config).unwrap();
    let times_a: Vec<f64> = a.trajectory.iter().map(|s| s.t).collect();
    let times_b: Vec<f64> = b.trajectory.iter().map(|s| s.t).collect();
    assert_eq!(times_a, times_b);
}

#[test]
fn adaptive_converges_to_fixed_reference_as_tolerance_shrinks() {
    // Short horizon keeps chaotic error growth bounded; the rk4 reference
    // at dt = 1e-4 is effectively exact at this scale
    let reference = run(&RunConfig {
        dt: 1e-4,
        t_end: Some(2.0),
        max_steps: None,
        ..Default::default()
    })
    .unwrap();
    let reference_final = &reference.trajectory.last().unwrap().state;

    let final_error = |tolerance: f64| -> f64 {
        let outcome = run(&RunConfig {
            scheme: Scheme::DormandPrince,
            tolerance,
            t_end: Some(2.0),
            max_steps: None,
            ..Default::default()
        })
        .unwrap();
        let state = &outcome.trajectory.last().unwrap().state;
        state
            .iter()
            .zip(reference_final.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    };

    let loose = final_error(1e-4);
    let tight = final_error(1e-9);
    assert!(tight < loose, "loose {loose}, tight {tight}");
    assert!(tight < 1e-4, "tight tolerance error {tight}");
}

#[test]
fn adaptive_takes_fewer_steps_than_fixed_at_equal_horizon() {
    let fixed = run(&RunConfig {
        dt: 0.001,
        t_end: Some(10.0),
        max_steps: None,
        ..Default::default()
    })
    .unwrap();
    let adaptive = run(&RunConfig {
        scheme: Scheme::DormandPrince,
        dt: 0.001,
        tolerance: 1e-6,
        t_end: Some(10.0),
        max_steps: None,
        ..Default::default()
    })
    .unwrap();
    assert!(adaptive.accepted_steps < fixed.accepted_steps);
}

#[test]
fn bounded_buffer_run_reports_evictions() {
    let config = RunConfig {
        max_steps: Some(1_000),
        max_buffer_size: Some(100),
        ..Default::default()
    };
    let handle = attractor_engine::spawn(&config).unwrap();
    let buffer = handle.buffer().clone();
    let outcome = handle.join();

    assert_eq!(outcome.status, RunStatus::Completed);
    // 1001 samples through a 100-slot ring: 901 evictions, last 100 retained
    assert_eq!(buffer.evicted(), 901);
    let snap = buffer.snapshot();
    assert_eq!(snap.len(), 100);
    assert_eq!(
        snap.last().unwrap().state,
        outcome.trajectory.last().unwrap().state
    );
}

#[test]
fn sweep_over_rho_produces_expected_statuses() {
    let base = RunConfig { max_steps: Some(500), ..Default::default() };
    let configs = linear_sweep(&base, "rho", (0.5, 28.0), 8).unwrap();
    let report = SweepDriver::new(configs, 4).unwrap().run().unwrap();

    assert_eq!(report.summary.completed, 8);
    assert_eq!(report.summary.diverged, 0);

    // Subcritical rho decays toward the origin; chaotic rho does not
    let first = report.entries[0].result.as_ref().unwrap();
    let origin_dist: f64 = first
        .trajectory
        .last()
        .unwrap()
        .state
        .iter()
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt();
    assert!(origin_dist < 0.5, "subcritical run ended at {origin_dist}");
}
