//! Prometheus metrics for the remediation controller
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports:
//! - `remediation_reconcile_duration_seconds` (histogram): reconcile wall time.
//! - `remediation_reconcile_errors_total` (counter): reconcile errors, labeled by phase.
//! - `remediation_phase_transitions_total` (counter): phase transitions, labeled by from/to.
//! - `remediation_active_total` (gauge): remediations currently outside the terminal phases.

use std::sync::atomic::AtomicI64;

use prometheus_client::encoding::{text::encode, EncodeLabelSet};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use tokio::sync::Mutex as AsyncMutex;

use crate::crd::RemediationPhase;

fn phase_label(phase: Option<RemediationPhase>) -> String {
    phase.map(|p| p.as_str().to_string()).unwrap_or_else(|| "unset".to_string())
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PhaseLabels {
    pub phase: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransitionLabels {
    pub from: String,
    pub to: String,
}

/// Registers and owns every metric this controller exports. Constructed
/// once at startup and shared via `Arc` with the reconciler and the
/// `/metrics` HTTP handler.
pub struct Metrics {
    registry: AsyncMutex<Registry>,
    reconcile_duration: Histogram,
    reconcile_errors: Family<PhaseLabels, Counter>,
    phase_transitions: Family<TransitionLabels, Counter>,
    active_total: Gauge<i64, AtomicI64>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconcile_duration = Histogram::new(exponential_buckets(0.01, 2.0, 12));
        registry.register(
            "remediation_reconcile_duration_seconds",
            "Time spent in a single reconcile",
            reconcile_duration.clone(),
        );

        let reconcile_errors = Family::<PhaseLabels, Counter>::default();
        registry.register(
            "remediation_reconcile_errors_total",
            "Reconcile errors, labeled by the phase observed at entry",
            reconcile_errors.clone(),
        );

        let phase_transitions = Family::<TransitionLabels, Counter>::default();
        registry.register(
            "remediation_phase_transitions_total",
            "Phase transitions the engine has driven",
            phase_transitions.clone(),
        );

        let active_total = Gauge::<i64, AtomicI64>::default();
        registry.register(
            "remediation_active_total",
            "Remediations currently outside the Deleting/Failed terminal phases",
            active_total.clone(),
        );

        Self {
            registry: AsyncMutex::new(registry),
            reconcile_duration,
            reconcile_errors,
            phase_transitions,
            active_total,
        }
    }

    pub fn observe_reconcile_duration(&self, seconds: f64) {
        self.reconcile_duration.observe(seconds);
    }

    pub fn record_reconcile_error(&self, phase: Option<RemediationPhase>) {
        self.reconcile_errors
            .get_or_create(&PhaseLabels { phase: phase_label(phase) })
            .inc();
    }

    /// Records a phase transition. A no-op when `before == after` (the
    /// engine re-entering the same phase on a requeue is not a transition).
    pub fn record_phase_transition(
        &self,
        before: Option<RemediationPhase>,
        after: Option<RemediationPhase>,
    ) {
        if before == after {
            return;
        }
        self.phase_transitions
            .get_or_create(&TransitionLabels {
                from: phase_label(before),
                to: phase_label(after),
            })
            .inc();

        match after {
            Some(RemediationPhase::Deleting) | Some(RemediationPhase::Failed) => {
                self.active_total.dec();
            }
            _ if before.is_none() => {
                self.active_total.inc();
            }
            _ => {}
        }
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub async fn encode(&self) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, &*self.registry.lock().await).expect("metric encoding is infallible");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
