// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Action Guard
// ─────────────────────────────────────────────────────────────────────
//! Blocks pending actions of entities whose harm exceeds a threshold.
//!
//! Harm for the whole set is computed from one snapshot before any
//! hook runs, so every decision in a pass sees the same state. A
//! failing or panicking hook is recorded for its entity and the pass
//! continues with the rest.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use equilibrium_dynamics::{DynamicsContext, DynamicsProvider};
use equilibrium_types::{
    Entity, EntityId, EquilibriumError, EquilibriumResult, GuardFailure, GuardReport, HarmRecord,
};

use crate::harm::HarmEvaluator;

/// Caller-defined side effect run for every blocked entity.
pub trait ActionHook: Send + Sync {
    fn prevent_action(&self, record: &HarmRecord) -> Result<(), String>;
}

impl<F> ActionHook for F
where
    F: Fn(&HarmRecord) -> Result<(), String> + Send + Sync,
{
    fn prevent_action(&self, record: &HarmRecord) -> Result<(), String> {
        self(record)
    }
}

/// Hook that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnly;

impl ActionHook for LogOnly {
    fn prevent_action(&self, record: &HarmRecord) -> Result<(), String> {
        log::info!("Action prevented for {} (harm {:.6e})", record.entity_id, record.harm);
        Ok(())
    }
}

/// Hook that keeps a queryable set of blocked entities until released.
#[derive(Debug, Default)]
pub struct BlockList {
    blocked: Mutex<BTreeSet<EntityId>>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self, id: &EntityId) -> bool {
        self.blocked.lock().contains(id)
    }

    /// Lift the block on one entity. Returns false if it was not blocked.
    pub fn release(&self, id: &EntityId) -> bool {
        self.blocked.lock().remove(id)
    }

    pub fn blocked(&self) -> BTreeSet<EntityId> {
        self.blocked.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.blocked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.lock().is_empty()
    }
}

impl ActionHook for BlockList {
    fn prevent_action(&self, record: &HarmRecord) -> Result<(), String> {
        self.blocked.lock().insert(record.entity_id.clone());
        Ok(())
    }
}

pub struct ActionGuard<'a> {
    dynamics: &'a dyn DynamicsProvider,
    threshold: f64,
}

impl<'a> ActionGuard<'a> {
    pub fn new(dynamics: &'a dyn DynamicsProvider, threshold: f64) -> EquilibriumResult<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(EquilibriumError::Config(format!(
                "guard threshold must be finite and >= 0, got {threshold}"
            )));
        }
        Ok(Self {
            dynamics,
            threshold,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Block every entity with `harm > threshold` and run `hook` for it.
    ///
    /// Fails only if harm cannot be computed, before any hook has run.
    pub fn enforce(
        &self,
        entities: &[Entity],
        tick: u64,
        hook: &dyn ActionHook,
    ) -> EquilibriumResult<GuardReport> {
        let ctx = DynamicsContext::new(tick, entities);
        let records = HarmEvaluator::new(self.dynamics).evaluate(&ctx)?;

        let mut report = GuardReport {
            evaluated: records.len(),
            ..Default::default()
        };

        for record in records.iter().filter(|r| r.harm > self.threshold) {
            log::warn!(
                "Blocking {}: harm {:.6e} > threshold {}",
                record.entity_id,
                record.harm,
                self.threshold
            );
            report.blocked.insert(record.entity_id.clone());

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                hook.prevent_action(record)
            }));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(message)) => message,
                Err(payload) => format!("hook panicked: {}", panic_message(payload.as_ref())),
            };
            log::error!("prevent_action failed for {}: {message}", record.entity_id);
            report.failures.push(GuardFailure {
                entity_id: record.entity_id.clone(),
                message,
            });
        }

        Ok(report)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
