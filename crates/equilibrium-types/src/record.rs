// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Entity and Report Records
// ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EquilibriumError, EquilibriumResult};

/// Stable identifier for an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u64> for EntityId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// A unit holding a numeric state. Its target is resolved through the
/// dynamics provider at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub state: f64,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, state: f64) -> Self {
        Self {
            id: id.into(),
            state,
        }
    }
}

/// Per-entity deviation, recomputed every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmRecord {
    pub entity_id: EntityId,
    /// `state_derivative - equilibrium_field`.
    pub deviation: f64,
    /// `|deviation|`, always >= 0.
    pub harm: f64,
}

impl HarmRecord {
    pub fn new(entity_id: EntityId, deviation: f64) -> Self {
        Self {
            entity_id,
            deviation,
            harm: deviation.abs(),
        }
    }
}

/// Alignment potential: `-Σ harm`. Zero iff every harm is zero.
pub fn alignment_potential(records: &[HarmRecord]) -> f64 {
    -records.iter().map(|r| r.harm).sum::<f64>()
}

/// Terminal status of a convergence run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Converged,
    NonConvergent,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Converged => "CONVERGED",
            Self::NonConvergent => "NON_CONVERGENT",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Outcome of one `run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub iterations_run: u64,
    /// Potential of the last committed state.
    pub final_potential: f64,
    /// Potential before the first iteration.
    pub initial_potential: f64,
    /// One post-adjustment potential per executed iteration.
    pub potential_history: Vec<f64>,
    /// Iterations that ran with step damping engaged.
    pub damped_iterations: u64,
    pub duration_ms: f64,
}

impl RunReport {
    pub fn converged(&self) -> bool {
        self.status == RunStatus::Converged
    }

    /// Total harm at the end of the run (`-final_potential`).
    pub fn final_harm(&self) -> f64 {
        -self.final_potential
    }
}

/// One row of an observability snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: EntityId,
    pub state: f64,
    pub harm: f64,
}

/// A `prevent_action` hook that failed for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardFailure {
    pub entity_id: EntityId,
    pub message: String,
}

impl From<GuardFailure> for EquilibriumError {
    fn from(f: GuardFailure) -> Self {
        EquilibriumError::GuardHook {
            entity_id: f.entity_id,
            message: f.message,
        }
    }
}

/// Outcome of one `enforce` pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardReport {
    /// Entities whose harm exceeded the threshold.
    pub blocked: BTreeSet<EntityId>,
    /// Hooks that failed, in store order.
    pub failures: Vec<GuardFailure>,
    /// Number of entities inspected.
    pub evaluated: usize,
}

impl GuardReport {
    pub fn is_blocked(&self, id: &EntityId) -> bool {
        self.blocked.contains(id)
    }

    /// Fail with the first hook failure, if any.
    pub fn ensure_no_failures(&self) -> EquilibriumResult<()> {
        match self.failures.first() {
            Some(f) => Err(f.clone().into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harm_is_absolute_deviation() {
        let rec = HarmRecord::new(EntityId::from("a"), -3.5);
        assert_eq!(rec.deviation, -3.5);
        assert_eq!(rec.harm, 3.5);
    }

    #[test]
    fn test_potential_of_empty_is_zero() {
        assert_eq!(alignment_potential(&[]), 0.0);
    }

    #[test]
    fn test_potential_sums_harm() {
        let records = vec![
            HarmRecord::new(EntityId::from("a"), 1.0),
            HarmRecord::new(EntityId::from("b"), -2.0),
        ];
        assert_eq!(alignment_potential(&records), -3.0);
    }

    #[test]
    fn test_entity_id_from_number() {
        assert_eq!(EntityId::from(7u64).as_str(), "7");
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&RunStatus::NonConvergent).unwrap();
        assert_eq!(json, "\"NON_CONVERGENT\"");
        assert_eq!(RunStatus::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_guard_report_fail_fast() {
        let mut report = GuardReport::default();
        assert!(report.ensure_no_failures().is_ok());
        report.failures.push(GuardFailure {
            entity_id: EntityId::from("b"),
            message: "actuator offline".into(),
        });
        let err = report.ensure_no_failures().unwrap_err();
        assert!(matches!(err, EquilibriumError::GuardHook { .. }));
        assert!(err.to_string().contains("actuator offline"));
    }
}
