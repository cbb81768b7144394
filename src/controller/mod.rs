//! Controller module for Metal3Remediation reconciliation
//!
//! Wires the Reconciliation Engine (`reconciler`) to its supporting
//! seams: the cluster accessor, the per-reconcile manager, the injectable
//! clock, the patch helper, and optional Prometheus metrics.

pub mod accessor;
pub mod clock;
pub mod leader;
pub mod manager_factory;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod patch;
mod reconciler;
pub mod remediation_manager;

pub use reconciler::{reconcile_generic, run_controller, ControllerState};
