//! Core engine types
//!
//! Samples, trajectories and run statuses shared by the step loop, the
//! buffer and the sweep driver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One accepted point of a trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Simulation time
    pub t: f64,
    /// Phase-space position at `t`
    pub state: Vec<f64>,
}

impl Sample {
    pub fn new(t: f64, state: Vec<f64>) -> Self {
        Self { t, state }
    }
}

/// An ordered sequence of samples produced by one run.
///
/// Append-only while the run is live; frozen once the run finalizes.
/// Times are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    samples: Vec<Sample>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        debug_assert!(
            self.samples.last().is_none_or(|last| sample.t > last.t),
            "trajectory times must be strictly increasing"
        );
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Iterate over `(t, state)` pairs
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Reached the requested horizon
    Completed,
    /// A step produced a non-finite state component
    Diverged,
    /// The adaptive controller could not satisfy the tolerance above `dt_min`
    StepSizeUnderflow,
    /// Cooperative stop; not a failure
    Cancelled,
}

impl RunStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Diverged | RunStatus::StepSizeUnderflow)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Completed => "completed",
            RunStatus::Diverged => "diverged",
            RunStatus::StepSizeUnderflow => "step_size_underflow",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Finalized result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// All emitted samples, in production order
    pub trajectory: Trajectory,
    /// Terminal status
    pub status: RunStatus,
    /// Accepted integration steps (rejected adaptive trials excluded)
    pub accepted_steps: u64,
    /// Simulation time at finalization
    pub final_t: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trajectory_push_and_order() {
        let mut traj = Trajectory::new();
        traj.push(Sample::new(0.0, vec![1.0, 1.0, 1.0]));
        traj.push(Sample::new(0.01, vec![1.0, 1.26, 0.99]));

        assert_eq!(traj.len(), 2);
        assert!(traj.first().unwrap().t < traj.last().unwrap().t);
    }

    #[test]
    fn test_status_failure_classification() {
        assert!(RunStatus::Diverged.is_failure());
        assert!(RunStatus::StepSizeUnderflow.is_failure());
        assert!(!RunStatus::Completed.is_failure());
        assert!(!RunStatus::Cancelled.is_failure());
    }
}
