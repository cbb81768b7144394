//! metal3-remediation: cluster-level power-cycle remediation controller
//!
//! Drives a `Metal3Remediation` through hard power-off, node eviction,
//! power-on, and node restoration, escalating to Machine deletion when the
//! retry budget is exhausted. See `SPEC_FULL.md` for the full design.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;

#[cfg(feature = "rest-api")]
pub mod rest_api;

#[cfg(feature = "admission-webhook")]
pub mod webhook;

pub use crate::error::{Error, Result};
