// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Dynamics Provider Interface
// ─────────────────────────────────────────────────────────────────────
//! Dynamics provider trait and reference implementations.
//!
//! The kernel treats both queries as opaque oracles. Implementations
//! must be deterministic for a fixed snapshot if runs are to be
//! reproducible. Non-finite returns are not handled here: the harm
//! evaluator turns them into `EquilibriumError::Dynamics`.

use std::collections::HashMap;

use equilibrium_types::{Entity, EntityId};

/// Read-only view handed to every provider call.
#[derive(Debug, Clone, Copy)]
pub struct DynamicsContext<'a> {
    /// Iteration index (0 before the first adjustment).
    pub tick: u64,
    /// Committed snapshot of every entity, in store order.
    pub entities: &'a [Entity],
}

impl<'a> DynamicsContext<'a> {
    pub fn new(tick: u64, entities: &'a [Entity]) -> Self {
        Self { tick, entities }
    }

    /// Mean committed state, or 0.0 for an empty snapshot.
    pub fn mean_state(&self) -> f64 {
        if self.entities.is_empty() {
            return 0.0;
        }
        self.entities.iter().map(|e| e.state).sum::<f64>() / self.entities.len() as f64
    }
}

/// Supplies the rate signal and equilibrium target for each entity.
pub trait DynamicsProvider: Send + Sync {
    fn state_derivative(&self, entity: &Entity, ctx: &DynamicsContext<'_>) -> f64;

    fn equilibrium_field(&self, entity: &Entity, ctx: &DynamicsContext<'_>) -> f64;
}

/// Constant per-entity targets; the observed signal is the state itself,
/// so harm reduces to `|state - target|`.
///
/// An entity with no registered target resolves to NaN.
#[derive(Debug, Clone, Default)]
pub struct StaticEquilibrium {
    targets: HashMap<EntityId, f64>,
    fallback: Option<f64>,
}

impl StaticEquilibrium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets(targets: HashMap<EntityId, f64>) -> Self {
        Self {
            targets,
            fallback: None,
        }
    }

    /// Same target for every entity.
    pub fn uniform(target: f64) -> Self {
        Self {
            targets: HashMap::new(),
            fallback: Some(target),
        }
    }

    pub fn with_target(mut self, id: impl Into<EntityId>, target: f64) -> Self {
        self.targets.insert(id.into(), target);
        self
    }

    pub fn set_target(&mut self, id: impl Into<EntityId>, target: f64) {
        self.targets.insert(id.into(), target);
    }

    pub fn target(&self, id: &EntityId) -> Option<f64> {
        self.targets.get(id).copied().or(self.fallback)
    }
}

impl DynamicsProvider for StaticEquilibrium {
    fn state_derivative(&self, entity: &Entity, _ctx: &DynamicsContext<'_>) -> f64 {
        entity.state
    }

    fn equilibrium_field(&self, entity: &Entity, _ctx: &DynamicsContext<'_>) -> f64 {
        self.target(&entity.id).unwrap_or_else(|| {
            log::warn!("no equilibrium target for {}", entity.id);
            f64::NAN
        })
    }
}

/// Consensus dynamics: every entity's target is the mean committed state
/// of the whole set.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanFieldEquilibrium;

impl DynamicsProvider for MeanFieldEquilibrium {
    fn state_derivative(&self, entity: &Entity, _ctx: &DynamicsContext<'_>) -> f64 {
        entity.state
    }

    fn equilibrium_field(&self, _entity: &Entity, ctx: &DynamicsContext<'_>) -> f64 {
        ctx.mean_state()
    }
}

type DynamicsFn = Box<dyn Fn(&Entity, &DynamicsContext<'_>) -> f64 + Send + Sync>;

/// Provider backed by caller-supplied closures.
pub struct ExternalDynamics {
    derivative_fn: DynamicsFn,
    field_fn: DynamicsFn,
}

impl ExternalDynamics {
    pub fn new<D, F>(derivative_fn: D, field_fn: F) -> Self
    where
        D: Fn(&Entity, &DynamicsContext<'_>) -> f64 + Send + Sync + 'static,
        F: Fn(&Entity, &DynamicsContext<'_>) -> f64 + Send + Sync + 'static,
    {
        Self {
            derivative_fn: Box::new(derivative_fn),
            field_fn: Box::new(field_fn),
        }
    }
}

impl DynamicsProvider for ExternalDynamics {
    fn state_derivative(&self, entity: &Entity, ctx: &DynamicsContext<'_>) -> f64 {
        (self.derivative_fn)(entity, ctx)
    }

    fn equilibrium_field(&self, entity: &Entity, ctx: &DynamicsContext<'_>) -> f64 {
        (self.field_fn)(entity, ctx)
    }
}
