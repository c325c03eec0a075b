// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Engine Handle
// ─────────────────────────────────────────────────────────────────────
//! Instance-scoped engine: one store, one dynamics provider, one step
//! policy. Independent handles share nothing and may run concurrently.
//!
//! ```
//! use std::sync::Arc;
//! use equilibrium_core::{CancellationToken, EngineHandle, LogOnly};
//! use equilibrium_dynamics::StaticEquilibrium;
//! use equilibrium_types::RunStatus;
//!
//! let mut engine =
//!     EngineHandle::initialize([("a", 10.0)], Arc::new(StaticEquilibrium::uniform(0.0)))
//!         .unwrap();
//! let report = engine.run(10_000, 1e-9, &CancellationToken::new()).unwrap();
//! assert_eq!(report.status, RunStatus::Converged);
//! assert!(engine.enforce(1e-6, &LogOnly).unwrap().blocked.is_empty());
//! ```

use std::sync::Arc;

use equilibrium_dynamics::{DynamicsContext, DynamicsProvider, ProportionalStep, StepPolicy};
use equilibrium_types::{
    alignment_potential, EngineConfig, Entity, EntityId, EquilibriumResult, GuardReport,
    HarmRecord, RunReport, SnapshotRow,
};

use crate::cancel::CancellationToken;
use crate::convergence::{ConvergenceLoop, RunOptions, StepDamping};
use crate::guard::{ActionGuard, ActionHook};
use crate::harm::HarmEvaluator;
use crate::store::{EntityStore, SharedStore, StoreReader};

/// Builder for [`EngineHandle`].
pub struct EngineBuilder {
    dynamics: Arc<dyn DynamicsProvider>,
    config: EngineConfig,
    policy: Option<Arc<dyn StepPolicy>>,
    entities: Vec<Entity>,
}

impl EngineBuilder {
    pub fn new(dynamics: Arc<dyn DynamicsProvider>) -> Self {
        Self {
            dynamics,
            config: EngineConfig::default(),
            policy: None,
            entities: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the default proportional policy built from
    /// `config.step_fraction`.
    pub fn step_policy(mut self, policy: Arc<dyn StepPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn entity(mut self, id: impl Into<EntityId>, state: f64) -> Self {
        self.entities.push(Entity::new(id, state));
        self
    }

    pub fn entities(mut self, entities: impl IntoIterator<Item = Entity>) -> Self {
        self.entities.extend(entities);
        self
    }

    pub fn build(self) -> EquilibriumResult<EngineHandle> {
        self.config.validate()?;
        let policy = match self.policy {
            Some(policy) => policy,
            None => Arc::new(ProportionalStep::from_config(&self.config)?),
        };
        let store = EntityStore::new(self.entities)?;
        log::info!(
            "Engine initialised: {} entities, policy '{}'",
            store.len(),
            policy.name()
        );
        Ok(EngineHandle {
            config: self.config,
            store: SharedStore::new(store),
            dynamics: self.dynamics,
            policy,
            tick: 0,
        })
    }
}

pub struct EngineHandle {
    config: EngineConfig,
    store: SharedStore,
    dynamics: Arc<dyn DynamicsProvider>,
    policy: Arc<dyn StepPolicy>,
    tick: u64,
}

impl EngineHandle {
    /// Create an engine with the default configuration from
    /// `(id, initial_state)` pairs.
    pub fn initialize<I, K>(
        entities: I,
        dynamics: Arc<dyn DynamicsProvider>,
    ) -> EquilibriumResult<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<EntityId>,
    {
        EngineBuilder::new(dynamics)
            .entities(entities.into_iter().map(|(id, state)| Entity::new(id, state)))
            .build()
    }

    pub fn builder(dynamics: Arc<dyn DynamicsProvider>) -> EngineBuilder {
        EngineBuilder::new(dynamics)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only store handle for outside readers; they only see
    /// committed iterations.
    pub fn store(&self) -> StoreReader {
        self.store.reader()
    }

    pub fn get(&self, id: &EntityId) -> EquilibriumResult<Entity> {
        self.store.get(id)
    }

    /// Iterations committed across all runs so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Run with explicit bounds.
    pub fn run(
        &mut self,
        max_iterations: u64,
        tolerance: f64,
        cancel: &CancellationToken,
    ) -> EquilibriumResult<RunReport> {
        self.run_with(&RunOptions::new(max_iterations, tolerance), cancel)
    }

    /// Run with the bounds from the engine configuration.
    pub fn run_default(&mut self, cancel: &CancellationToken) -> EquilibriumResult<RunReport> {
        let options = RunOptions::from_config(&self.config);
        self.run_with(&options, cancel)
    }

    pub fn run_with(
        &mut self,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> EquilibriumResult<RunReport> {
        let mut convergence =
            ConvergenceLoop::new(&self.store, self.dynamics.as_ref(), self.policy.as_ref())
                .with_damping(StepDamping::from_config(&self.config))
                .with_parallel(self.config.parallel);
        let result = convergence.run(options, cancel, self.tick);
        // Iterations committed before a failure still advance the tick.
        self.tick += convergence.iterations_committed();
        result
    }

    /// Guard pass at an explicit threshold.
    pub fn enforce(
        &self,
        threshold: f64,
        hook: &dyn ActionHook,
    ) -> EquilibriumResult<GuardReport> {
        let guard = ActionGuard::new(self.dynamics.as_ref(), threshold)?;
        guard.enforce(&self.store.snapshot(), self.tick, hook)
    }

    /// Guard pass at `config.guard_threshold`.
    pub fn enforce_default(&self, hook: &dyn ActionHook) -> EquilibriumResult<GuardReport> {
        self.enforce(self.config.guard_threshold, hook)
    }

    pub fn harm_records(&self) -> EquilibriumResult<Vec<HarmRecord>> {
        let snapshot = self.store.snapshot();
        HarmEvaluator::new(self.dynamics.as_ref())
            .evaluate(&DynamicsContext::new(self.tick, &snapshot))
    }

    pub fn alignment_potential(&self) -> EquilibriumResult<f64> {
        Ok(alignment_potential(&self.harm_records()?))
    }

    /// `(id, state, harm)` for every entity, in store order.
    pub fn snapshot(&self) -> EquilibriumResult<Vec<SnapshotRow>> {
        let snapshot = self.store.snapshot();
        let records = HarmEvaluator::new(self.dynamics.as_ref())
            .evaluate(&DynamicsContext::new(self.tick, &snapshot))?;
        Ok(snapshot
            .into_iter()
            .zip(records)
            .map(|(entity, record)| SnapshotRow {
                id: entity.id,
                state: entity.state,
                harm: record.harm,
            })
            .collect())
    }
}
