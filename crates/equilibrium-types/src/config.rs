// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Engine Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{EquilibriumError, EquilibriumResult};

/// Runtime configuration for an engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on convergence iterations per run.
    /// Default: 10 000.
    pub max_iterations: u64,

    /// Convergence holds once `|potential| <= tolerance`.
    /// Default: 1e-9.
    pub tolerance: f64,

    /// The guard blocks entities whose harm is strictly above this.
    /// Default: 0.0.
    pub guard_threshold: f64,

    /// Fraction α of the deviation covered per step by the default
    /// proportional policy, in (0, 1].
    /// Default: 0.5.
    pub step_fraction: f64,

    /// Consecutive iterations of rising total harm before step damping
    /// engages. 0 disables damping.
    /// Default: 5.
    pub damping_window: usize,

    /// Multiplier applied to proposed moves while damping is engaged.
    /// Default: 0.5.
    pub damping_factor: f64,

    /// Compute next-state buffers in parallel (needs the `parallel`
    /// feature of `equilibrium-core`).
    /// Default: false.
    pub parallel: bool,
}

/// Termination bounds shared by `EngineConfig` and per-run options:
/// at least one iteration, finite non-negative tolerance.
pub fn validate_run_bounds(max_iterations: u64, tolerance: f64) -> EquilibriumResult<()> {
    if max_iterations < 1 {
        return Err(EquilibriumError::Config(
            "max_iterations must be >= 1".to_string(),
        ));
    }
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(EquilibriumError::Config(format!(
            "tolerance must be finite and >= 0, got {tolerance}"
        )));
    }
    Ok(())
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-9,
            guard_threshold: 0.0,
            step_fraction: 0.5,
            damping_window: 5,
            damping_factor: 0.5,
            parallel: false,
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> EquilibriumResult<()> {
        validate_run_bounds(self.max_iterations, self.tolerance)?;
        if !self.guard_threshold.is_finite() || self.guard_threshold < 0.0 {
            return Err(EquilibriumError::Config(format!(
                "guard_threshold must be finite and >= 0, got {}",
                self.guard_threshold
            )));
        }
        if !(self.step_fraction > 0.0 && self.step_fraction <= 1.0) {
            return Err(EquilibriumError::Config(format!(
                "step_fraction must be in (0, 1], got {}",
                self.step_fraction
            )));
        }
        if !(self.damping_factor > 0.0 && self.damping_factor <= 1.0) {
            return Err(EquilibriumError::Config(format!(
                "damping_factor must be in (0, 1], got {}",
                self.damping_factor
            )));
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> EquilibriumResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| EquilibriumError::Config(format!("JSON parse error: {e}")))
    }
}
