// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Core Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Equilibrium-convergence control engine: entity store, harm
//! evaluator, bounded convergence loop and action guard.
//!
//! # Invariants
//!
//! 1. **Harm is never negative and never silently repaired**: harm is
//!    `|derivative − target|`; a NaN or infinite value from the dynamics
//!    provider or step policy aborts the operation with
//!    `EquilibriumError::Dynamics` naming the entity.
//!
//! 2. **Every run terminates**: a run ends `Converged` once
//!    `|potential| <= tolerance`, `NonConvergent` after `max_iterations`,
//!    or `Cancelled` when the token is set at an iteration boundary.
//!
//! 3. **Iterations are atomic**: adjustments read only the previous
//!    committed snapshot and are written to a separate buffer that is
//!    committed whole, under the store's write lock.
//!
//! 4. **Guard decisions share one snapshot**: all harms of a guard pass
//!    are computed before the first hook runs; a hook failure never
//!    stops the pass.

pub mod cancel;
pub mod convergence;
pub mod engine;
pub mod guard;
pub mod harm;
pub mod store;

pub use cancel::CancellationToken;
pub use convergence::{ConvergenceLoop, RunOptions, StepDamping};
pub use engine::{EngineBuilder, EngineHandle};
pub use guard::{ActionGuard, ActionHook, BlockList, LogOnly};
pub use harm::{HarmEvaluator, Resolved};
pub use store::{EntityStore, SharedStore, StoreReader};
