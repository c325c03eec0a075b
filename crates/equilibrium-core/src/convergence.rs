// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Convergence Loop
// ─────────────────────────────────────────────────────────────────────
//! Bounded, cancellable control loop driving every entity toward its
//! equilibrium.
//!
//! Per iteration:
//!   1. Check cancellation.
//!   2. Build the next-state buffer from the committed snapshot
//!      (never from partially adjusted states).
//!   3. Commit the whole buffer.
//!   4. Recompute the alignment potential on the committed state.
//!   5. Stop with `Converged` once `|potential| <= tolerance`.
//!
//! After `max_iterations` without reaching tolerance the run ends with
//! `NonConvergent`. Any non-finite dynamics value aborts the run with
//! `EquilibriumError::Dynamics`; a failed buffer is never committed.
//!
//! Ticks passed to the dynamics provider count committed iterations:
//! iteration `i` adjusts from tick `start + i - 1` and is evaluated at
//! tick `start + i`.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use equilibrium_dynamics::{DynamicsContext, DynamicsProvider, StepInput, StepPolicy};
use equilibrium_types::{
    validate_run_bounds, DynamicsQuantity, EngineConfig, Entity, EquilibriumError,
    EquilibriumResult, RunReport, RunStatus,
};

use crate::cancel::CancellationToken;
use crate::harm::HarmEvaluator;
use crate::store::SharedStore;

/// Per-run termination bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub max_iterations: u64,
    pub tolerance: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RunOptions {
    pub fn new(max_iterations: u64, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_iterations, config.tolerance)
    }

    pub fn validate(&self) -> EquilibriumResult<()> {
        validate_run_bounds(self.max_iterations, self.tolerance)
    }

    fn is_converged(&self, potential: f64) -> bool {
        potential.abs() <= self.tolerance
    }
}

/// Step damping: once total harm has risen for `window` consecutive
/// iterations, proposed moves are scaled by `factor`, compounding while
/// the rise continues. The scale resets as soon as harm stops rising.
#[derive(Debug, Clone)]
pub struct StepDamping {
    window: usize,
    factor: f64,
    recent: VecDeque<f64>,
    scale: f64,
    engagements: u32,
}

impl StepDamping {
    pub fn new(window: usize, factor: f64) -> Self {
        Self {
            window,
            factor,
            recent: VecDeque::with_capacity(window + 1),
            scale: 1.0,
            engagements: 0,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.damping_window, config.damping_factor)
    }

    /// Multiplier for the next adjustment.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn engagements(&self) -> u32 {
        self.engagements
    }

    /// Record a total-harm sample. Returns true if damping is engaged.
    pub fn observe(&mut self, total_harm: f64) -> bool {
        if self.window == 0 {
            return false;
        }
        self.recent.push_back(total_harm);
        if self.recent.len() > self.window + 1 {
            self.recent.pop_front();
        }
        if self.recent.len() < self.window + 1 {
            return false;
        }

        let rising = self
            .recent
            .iter()
            .zip(self.recent.iter().skip(1))
            .all(|(a, b)| a < b);

        if rising {
            self.scale *= self.factor;
            self.engagements += 1;
            log::warn!(
                "Total harm rose for {} consecutive iterations, damping steps to {:.4}",
                self.window,
                self.scale
            );
        } else {
            self.scale = 1.0;
        }
        rising
    }
}

pub struct ConvergenceLoop<'a> {
    store: &'a SharedStore,
    dynamics: &'a dyn DynamicsProvider,
    policy: &'a dyn StepPolicy,
    damping: StepDamping,
    parallel: bool,
    committed: u64,
}

impl<'a> ConvergenceLoop<'a> {
    pub fn new(
        store: &'a SharedStore,
        dynamics: &'a dyn DynamicsProvider,
        policy: &'a dyn StepPolicy,
    ) -> Self {
        Self {
            store,
            dynamics,
            policy,
            damping: StepDamping::new(0, 1.0),
            parallel: false,
            committed: 0,
        }
    }

    pub fn with_damping(mut self, damping: StepDamping) -> Self {
        self.damping = damping;
        self
    }

    /// Build next-state buffers with rayon. Ignored unless the
    /// `parallel` feature is enabled.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Iterations committed by the last `run`, including those of a
    /// run that ended in an error.
    pub fn iterations_committed(&self) -> u64 {
        self.committed
    }

    /// Run until converged, out of iterations, or cancelled.
    ///
    /// `start_tick` is the number of iterations already committed to
    /// the store by earlier runs. A token that is already cancelled
    /// stops the run before the provider is queried; both potentials of
    /// that report are NaN.
    pub fn run(
        &mut self,
        options: &RunOptions,
        cancel: &CancellationToken,
        start_tick: u64,
    ) -> EquilibriumResult<RunReport> {
        options.validate()?;
        self.committed = 0;
        let start = Instant::now();

        if cancel.is_cancelled() {
            let report = RunReport {
                status: RunStatus::Cancelled,
                iterations_run: 0,
                final_potential: f64::NAN,
                initial_potential: f64::NAN,
                potential_history: Vec::new(),
                damped_iterations: 0,
                duration_ms: 0.0,
            };
            return Ok(self.finish(report, start));
        }

        let evaluator = HarmEvaluator::new(self.dynamics);
        let mut committed = self.store.snapshot();
        let initial_potential = evaluator
            .compute_alignment_potential(&DynamicsContext::new(start_tick, &committed))?;

        let mut report = RunReport {
            status: RunStatus::NonConvergent,
            iterations_run: 0,
            final_potential: initial_potential,
            initial_potential,
            potential_history: Vec::new(),
            damped_iterations: 0,
            duration_ms: 0.0,
        };

        if options.is_converged(initial_potential) {
            report.status = RunStatus::Converged;
            return Ok(self.finish(report, start));
        }
        self.damping.observe(-initial_potential);

        for iteration in 1..=options.max_iterations {
            if cancel.is_cancelled() {
                report.status = RunStatus::Cancelled;
                return Ok(self.finish(report, start));
            }

            let tick = start_tick + iteration - 1;
            let scale = self.damping.scale();
            let ctx = DynamicsContext::new(tick, &committed);
            let next = self.next_states(&evaluator, &ctx, scale)?;
            self.store.commit(&next)?;
            self.committed += 1;
            for (entity, state) in committed.iter_mut().zip(next) {
                entity.state = state;
            }

            let potential = evaluator
                .compute_alignment_potential(&DynamicsContext::new(tick + 1, &committed))?;
            report.iterations_run = iteration;
            report.final_potential = potential;
            report.potential_history.push(potential);
            if scale < 1.0 {
                report.damped_iterations += 1;
            }
            log::debug!("iteration {iteration}: potential={potential:.6e} scale={scale:.4}");

            if options.is_converged(potential) {
                report.status = RunStatus::Converged;
                return Ok(self.finish(report, start));
            }
            self.damping.observe(-potential);
        }

        Ok(self.finish(report, start))
    }

    fn next_states(
        &self,
        evaluator: &HarmEvaluator<'_>,
        ctx: &DynamicsContext<'_>,
        scale: f64,
    ) -> EquilibriumResult<Vec<f64>> {
        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                use rayon::prelude::*;
                return ctx
                    .entities
                    .par_iter()
                    .map(|e| self.propose(evaluator, e, ctx, scale))
                    .collect();
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            if self.parallel {
                log::debug!("parallel adjustment requested without the `parallel` feature");
            }
        }

        ctx.entities
            .iter()
            .map(|e| self.propose(evaluator, e, ctx, scale))
            .collect()
    }

    /// `adjust_towards_equilibrium` for one entity, from the committed
    /// snapshot only.
    fn propose(
        &self,
        evaluator: &HarmEvaluator<'_>,
        entity: &Entity,
        ctx: &DynamicsContext<'_>,
        scale: f64,
    ) -> EquilibriumResult<f64> {
        let resolved = evaluator.resolve(entity, ctx)?;
        let proposed = self.policy.next_state(&StepInput {
            state: entity.state,
            derivative: resolved.derivative,
            target: resolved.target,
        });
        let next = if scale < 1.0 {
            entity.state + scale * (proposed - entity.state)
        } else {
            proposed
        };
        if !next.is_finite() {
            log::error!(
                "step policy '{}' proposed {next} for {}",
                self.policy.name(),
                entity.id
            );
            return Err(EquilibriumError::dynamics(
                &entity.id,
                DynamicsQuantity::NextState,
                next,
            ));
        }
        Ok(next)
    }

    fn finish(&self, mut report: RunReport, start: Instant) -> RunReport {
        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "Convergence run {}: {} iterations, potential {:.6e}",
            report.status,
            report.iterations_run,
            report.final_potential
        );
        report
    }
}
