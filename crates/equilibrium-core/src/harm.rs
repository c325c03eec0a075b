// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Harm Evaluator
// ─────────────────────────────────────────────────────────────────────
//! Per-entity harm and aggregate alignment potential.
//!
//! `harm = |state_derivative − equilibrium_field|`, `potential = −Σ harm`.
//! Pure computation. Non-finite provider output is an error, never
//! clamped.

use equilibrium_dynamics::{DynamicsContext, DynamicsProvider};
use equilibrium_types::{
    alignment_potential, DynamicsQuantity, Entity, EquilibriumError, EquilibriumResult,
    HarmRecord,
};

/// Resolved dynamics for one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub derivative: f64,
    pub target: f64,
}

pub struct HarmEvaluator<'a> {
    dynamics: &'a dyn DynamicsProvider,
}

impl<'a> HarmEvaluator<'a> {
    pub fn new(dynamics: &'a dyn DynamicsProvider) -> Self {
        Self { dynamics }
    }

    /// Query both oracles and reject non-finite values.
    pub fn resolve(
        &self,
        entity: &Entity,
        ctx: &DynamicsContext<'_>,
    ) -> EquilibriumResult<Resolved> {
        let target = self.dynamics.equilibrium_field(entity, ctx);
        if !target.is_finite() {
            log::error!("equilibrium_field for {} returned {target}", entity.id);
            return Err(EquilibriumError::dynamics(
                &entity.id,
                DynamicsQuantity::EquilibriumField,
                target,
            ));
        }
        let derivative = self.dynamics.state_derivative(entity, ctx);
        if !derivative.is_finite() {
            log::error!("state_derivative for {} returned {derivative}", entity.id);
            return Err(EquilibriumError::dynamics(
                &entity.id,
                DynamicsQuantity::StateDerivative,
                derivative,
            ));
        }
        Ok(Resolved { derivative, target })
    }

    pub fn compute_harm(
        &self,
        entity: &Entity,
        ctx: &DynamicsContext<'_>,
    ) -> EquilibriumResult<HarmRecord> {
        let resolved = self.resolve(entity, ctx)?;
        let deviation = resolved.derivative - resolved.target;
        if !deviation.is_finite() {
            return Err(EquilibriumError::dynamics(
                &entity.id,
                DynamicsQuantity::Harm,
                deviation,
            ));
        }
        Ok(HarmRecord::new(entity.id.clone(), deviation))
    }

    /// Harm for every entity in `ctx.entities`, in order.
    pub fn evaluate(&self, ctx: &DynamicsContext<'_>) -> EquilibriumResult<Vec<HarmRecord>> {
        ctx.entities
            .iter()
            .map(|e| self.compute_harm(e, ctx))
            .collect()
    }

    pub fn compute_alignment_potential(
        &self,
        ctx: &DynamicsContext<'_>,
    ) -> EquilibriumResult<f64> {
        let records = self.evaluate(ctx)?;
        Ok(alignment_potential(&records))
    }
}
