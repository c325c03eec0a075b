// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Step Policies
// ─────────────────────────────────────────────────────────────────────
//! Strategies for `adjust_towards_equilibrium`.
//!
//! A policy maps one entity's committed state, rate signal and target
//! to a proposed next state. Policies are pure: the convergence loop
//! owns buffering, damping and the finiteness check.

use serde::{Deserialize, Serialize};

use equilibrium_types::{EngineConfig, EquilibriumError, EquilibriumResult};

/// Per-entity inputs to a step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub state: f64,
    pub derivative: f64,
    pub target: f64,
}

pub trait StepPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Proposed next state. Harm should not increase for a stationary
    /// target in the noiseless case.
    fn next_state(&self, input: &StepInput) -> f64;
}

/// Move a fixed fraction α of the way to the target:
/// `s' = s + α (target - s)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProportionalStep {
    pub alpha: f64,
}

impl ProportionalStep {
    pub fn new(alpha: f64) -> EquilibriumResult<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(EquilibriumError::Config(format!(
                "proportional step alpha must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }

    pub fn from_config(config: &EngineConfig) -> EquilibriumResult<Self> {
        Self::new(config.step_fraction)
    }
}

impl Default for ProportionalStep {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

impl StepPolicy for ProportionalStep {
    fn name(&self) -> &str {
        "proportional"
    }

    fn next_state(&self, input: &StepInput) -> f64 {
        input.state + self.alpha * (input.target - input.state)
    }
}

/// Explicit Euler over `ds/dt = gain · (target - derivative)`.
///
/// For providers whose derivative is the state itself this is a
/// proportional step with `α = dt · gain`; it is stable while
/// `0 < dt · gain <= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerStep {
    pub dt: f64,
    pub gain: f64,
}

impl EulerStep {
    pub fn new(dt: f64, gain: f64) -> EquilibriumResult<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(EquilibriumError::Config(format!(
                "euler dt must be finite and > 0, got {dt}"
            )));
        }
        if !gain.is_finite() {
            return Err(EquilibriumError::Config(format!(
                "euler gain must be finite, got {gain}"
            )));
        }
        Ok(Self { dt, gain })
    }
}

impl Default for EulerStep {
    /// dt=0.1, gain=1.0.
    fn default() -> Self {
        Self { dt: 0.1, gain: 1.0 }
    }
}

impl StepPolicy for EulerStep {
    fn name(&self) -> &str {
        "euler"
    }

    fn next_state(&self, input: &StepInput) -> f64 {
        input.state + self.dt * self.gain * (input.target - input.derivative)
    }
}

type StepFn = Box<dyn Fn(&StepInput) -> f64 + Send + Sync>;

/// Step policy backed by a caller-supplied closure.
pub struct ExternalStep {
    name: String,
    step_fn: StepFn,
}

impl ExternalStep {
    pub fn new<F>(name: impl Into<String>, step_fn: F) -> Self
    where
        F: Fn(&StepInput) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            step_fn: Box::new(step_fn),
        }
    }
}

impl StepPolicy for ExternalStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_state(&self, input: &StepInput) -> f64 {
        (self.step_fn)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(state: f64, target: f64) -> StepInput {
        StepInput {
            state,
            derivative: state,
            target,
        }
    }

    #[test]
    fn test_proportional_halves_deviation() {
        let policy = ProportionalStep::new(0.5).unwrap();
        assert_eq!(policy.next_state(&input(10.0, 0.0)), 5.0);
        assert_eq!(policy.next_state(&input(-4.0, 2.0)), -1.0);
    }

    #[test]
    fn test_proportional_full_step_lands_on_target() {
        let policy = ProportionalStep::new(1.0).unwrap();
        assert_eq!(policy.next_state(&input(3.0, -7.0)), -7.0);
    }

    #[test]
    fn test_proportional_rejects_bad_alpha() {
        assert!(ProportionalStep::new(0.0).is_err());
        assert!(ProportionalStep::new(1.01).is_err());
        assert!(ProportionalStep::new(f64::NAN).is_err());
    }

    #[test]
    fn test_proportional_harm_non_increasing() {
        let policy = ProportionalStep::new(0.3).unwrap();
        let target: f64 = 1.5;
        let mut state: f64 = -20.0;
        let mut prev = (state - target).abs();
        for _ in 0..100 {
            state = policy.next_state(&input(state, target));
            let harm = (state - target).abs();
            assert!(harm <= prev, "harm rose: {prev} -> {harm}");
            prev = harm;
        }
    }

    #[test]
    fn test_euler_uses_derivative() {
        let policy = EulerStep::new(0.5, 2.0).unwrap();
        let step = StepInput {
            state: 1.0,
            derivative: 3.0,
            target: 4.0,
        };
        // 1 + 0.5 * 2 * (4 - 3) = 2
        assert!((policy.next_state(&step) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_euler_rejects_non_positive_dt() {
        assert!(EulerStep::new(0.0, 1.0).is_err());
        assert!(EulerStep::new(0.1, f64::INFINITY).is_err());
    }

    #[test]
    fn test_external_step() {
        let policy = ExternalStep::new("snap", |i| i.target);
        assert_eq!(policy.name(), "snap");
        assert_eq!(policy.next_state(&input(9.0, 1.0)), 1.0);
    }
}
