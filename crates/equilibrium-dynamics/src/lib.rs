// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Dynamics
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Pluggable collaborators of the convergence loop: dynamics providers
//! (rate signal + equilibrium target per entity) and step policies
//! (how one adjustment moves a state).

pub mod provider;
pub mod step;

pub use provider::{
    DynamicsContext, DynamicsProvider, ExternalDynamics, MeanFieldEquilibrium, StaticEquilibrium,
};
pub use step::{EulerStep, ExternalStep, ProportionalStep, StepInput, StepPolicy};
