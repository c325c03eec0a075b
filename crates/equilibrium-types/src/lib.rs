// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Entity and report records, configuration, and error hierarchy
//! shared by every Equilibrium Kernel crate.

pub mod config;
pub mod error;
pub mod record;

pub use config::{validate_run_bounds, EngineConfig};
pub use error::{DynamicsQuantity, EquilibriumError, EquilibriumResult};
pub use record::{
    alignment_potential, Entity, EntityId, GuardFailure, GuardReport, HarmRecord, RunReport,
    RunStatus, SnapshotRow,
};
