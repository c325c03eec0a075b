// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::EntityId;

/// Which dynamics quantity came back non-finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynamicsQuantity {
    StateDerivative,
    EquilibriumField,
    /// `|derivative - target|` overflowed.
    Harm,
    /// The step policy proposed a non-finite next state.
    NextState,
}

impl fmt::Display for DynamicsQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StateDerivative => "state_derivative",
            Self::EquilibriumField => "equilibrium_field",
            Self::Harm => "harm",
            Self::NextState => "next_state",
        };
        f.write_str(name)
    }
}

/// Root error type for all Equilibrium Kernel failures.
///
/// Non-convergence and cancellation are reported through
/// [`RunStatus`](crate::RunStatus), not through this type.
#[derive(Error, Debug)]
pub enum EquilibriumError {
    /// Entity id absent from the store.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// The same id was supplied twice at initialization.
    #[error("duplicate entity id: {0}")]
    DuplicateEntity(EntityId),

    /// A dynamics or step-policy value was NaN or infinite.
    #[error("dynamics error: {quantity} for entity {entity_id} returned {value}")]
    Dynamics {
        entity_id: EntityId,
        quantity: DynamicsQuantity,
        value: f64,
    },

    /// A `prevent_action` hook failed.
    #[error("guard hook failed for entity {entity_id}: {message}")]
    GuardHook { entity_id: EntityId, message: String },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// A next-state buffer did not match the store size.
    #[error("buffer mismatch: expected {expected} states, got {actual}")]
    BufferMismatch { expected: usize, actual: usize },
}

impl EquilibriumError {
    pub fn dynamics(entity_id: &EntityId, quantity: DynamicsQuantity, value: f64) -> Self {
        Self::Dynamics {
            entity_id: entity_id.clone(),
            quantity,
            value,
        }
    }

    /// Entity id carried by the error, if any.
    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::NotFound(id) | Self::DuplicateEntity(id) => Some(id),
            Self::Dynamics { entity_id, .. } | Self::GuardHook { entity_id, .. } => {
                Some(entity_id)
            }
            Self::Config(_) | Self::BufferMismatch { .. } => None,
        }
    }
}

pub type EquilibriumResult<T> = Result<T, EquilibriumError>;
