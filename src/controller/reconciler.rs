//! Reconciliation Engine
//!
//! The phase state machine: `unset -> Running -> Waiting -> {Running,
//! Deleting}`, plus the `Failed` sink. Ported from
//! `original_source/pkg/controller/metal3remediation/metal3remediation_controller.go`'s
//! `Reconcile` / `reconcileNormal` / `remediateRebootStrategy`, generalized
//! over [`ResourceAccessor`] so it can run against a real cluster or the
//! in-memory fake.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use tracing::{error, info, instrument, warn};

use crate::crd::{
    BareMetalHost, Machine, Metal3Remediation, RemediationPhase, REBOOT_REMEDIATION_STRATEGY,
};
use crate::error::{is_forbidden, Error, Result};

use super::accessor::{KubeAccessor, ResourceAccessor};
use super::clock::Clock;
use super::manager_factory::ManagerFactory;
use super::patch::PatchHelper;
use super::remediation_manager::{restore_node, RemediationManager};

#[cfg(feature = "metrics")]
use super::metrics::Metrics;

/// State shared across reconciles, generic over the cluster seam so tests
/// can swap in [`super::accessor::FakeAccessor`].
pub struct ControllerState<A: ResourceAccessor> {
    pub accessor: Arc<A>,
    pub clock: Arc<dyn Clock>,
    #[cfg(feature = "metrics")]
    pub metrics: Option<Arc<Metrics>>,
}

impl<A: ResourceAccessor> ControllerState<A> {
    fn factory(&self) -> ManagerFactory<A> {
        ManagerFactory::new(self.accessor.clone(), self.clock.clone())
    }
}

/// Entry point wired to `kube_runtime::Controller`.
pub async fn run_controller(client: Client, state: Arc<ControllerState<KubeAccessor>>) -> Result<()> {
    let remediations: Api<Metal3Remediation> = Api::all(client.clone());

    remediations.list(&Default::default()).await.map_err(|e| {
        error!(error = %e, "Metal3Remediation CRD is not available");
        Error::ConfigError("Metal3Remediation CRD not installed".to_string())
    })?;

    info!("starting Metal3Remediation controller");

    Controller::new(remediations, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!(object = ?obj, "reconciled"),
                Err(e) => error!(error = %e, "reconcile failed"),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(ctx), fields(metal3remediation = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(
    obj: Arc<Metal3Remediation>,
    ctx: Arc<ControllerState<KubeAccessor>>,
) -> Result<Action> {
    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();
    let phase_before = obj.status.as_ref().and_then(|s| s.phase);

    let result = reconcile_generic(obj, ctx.clone()).await;

    #[cfg(feature = "metrics")]
    if let Some(metrics) = &ctx.metrics {
        metrics.observe_reconcile_duration(started.elapsed().as_secs_f64());
        if result.is_err() {
            metrics.record_reconcile_error(phase_before);
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = phase_before;

    result
}

fn error_policy(
    _obj: Arc<Metal3Remediation>,
    error: &Error,
    _ctx: Arc<ControllerState<KubeAccessor>>,
) -> Action {
    error!(error = %error, "reconcile error, requeueing");
    Action::requeue(Duration::from_secs(30))
}

/// The actual reconcile body, generic over the accessor so reconciler-level
/// tests run it directly against [`super::accessor::FakeAccessor`].
///
/// Implements the commit-on-every-exit-path contract from step 2 of the
/// algorithm: the Remediation is snapshotted up front, and whatever state
/// the phase machine leaves it in is diffed and patched before this
/// function returns, whether the phase machine succeeded or not.
pub async fn reconcile_generic<A: ResourceAccessor>(
    obj: Arc<Metal3Remediation>,
    ctx: Arc<ControllerState<A>>,
) -> Result<Action> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    let remediation = obj.as_ref().clone();
    let snapshot = PatchHelper::snapshot(&remediation)?;

    let machine = resolve_machine(&remediation, &ctx).await?;

    let mut mgr = ctx.factory().new_remediation_manager(remediation, machine);
    let action = run_phase_machine(&mut mgr, &ctx).await;

    if action.is_ok() {
        let generation = mgr.remediation.metadata.generation;
        mgr.remediation
            .status
            .get_or_insert_with(Default::default)
            .observed_generation = generation;
    }

    // `Metal3Remediation` declares a status subresource, so metadata and
    // status must be committed as two independent writes: the main-resource
    // PATCH endpoint silently drops `.status`, and `/status` silently drops
    // everything else.
    let (metadata_patch, status_patch) = snapshot.diff(&mgr.remediation)?;
    if let Some(m) = metadata_patch {
        ctx.accessor
            .patch_remediation_metadata(&namespace, &name, serde_json::json!({ "metadata": m }))
            .await?;
    }
    if let Some(s) = status_patch {
        ctx.accessor
            .patch_remediation_status(&namespace, &name, serde_json::json!({ "status": s }))
            .await?;
    }

    action
}

/// Resolves the owning Machine via `ownerReferences[kind=Machine]`. A
/// missing owner reference, or a referenced Machine that no longer exists,
/// is fatal for this reconcile per the not-found table in the error
/// handling design.
async fn resolve_machine<A: ResourceAccessor>(
    remediation: &Metal3Remediation,
    ctx: &ControllerState<A>,
) -> Result<Machine> {
    let namespace = remediation.namespace().unwrap_or_default();
    let owner = remediation
        .owner_references()
        .iter()
        .find(|o| o.kind == "Machine")
        .ok_or_else(|| Error::MissingOwnerRef(remediation.name_any()))?;

    ctx.accessor
        .get_machine(&namespace, &owner.name)
        .await?
        .ok_or_else(|| {
            Error::ConfigError(format!(
                "Machine {}/{} referenced by Metal3Remediation {} not found",
                namespace,
                owner.name,
                remediation.name_any()
            ))
        })
}

/// Steps 4–9 of the per-reconcile algorithm.
async fn run_phase_machine<A: ResourceAccessor>(
    mgr: &mut RemediationManager<A>,
    ctx: &ControllerState<A>,
) -> Result<Action> {
    // Step 4: resolve the unhealthy Host. A host that genuinely does not
    // exist is treated as a requeue, never dereferenced as phase input
    // (the nil-host dereference in the source is intentionally not
    // reproduced).
    let host = match mgr.get_unhealthy_host().await? {
        Some(h) => h,
        None => return Ok(Action::requeue(Duration::from_secs(10))),
    };

    // Step 5: unremediable check.
    if !mgr.online_status(&host) {
        mgr.set_remediation_phase(RemediationPhase::Failed);
        return Ok(Action::await_change());
    }

    // Step 6: strategy check.
    if mgr.remediation.spec.strategy.type_ != REBOOT_REMEDIATION_STRATEGY {
        return Ok(Action::await_change());
    }

    // Step 7: initialization.
    if mgr.get_remediation_phase().is_none() {
        mgr.set_remediation_phase(RemediationPhase::Running);
        mgr.set_last_remediation_time();
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    // Step 8: node fetch.
    let (node, is_node_forbidden) = match mgr.get_node().await {
        Ok(n) => (n, false),
        Err(e) if is_forbidden(&e) => {
            warn!("node lookup forbidden, degrading without node restore");
            (None, true)
        }
        Err(e) => return Err(e),
    };

    #[cfg(feature = "metrics")]
    let phase_before = mgr.get_remediation_phase();

    let action = match mgr.get_remediation_phase() {
        Some(RemediationPhase::Running) => running_phase(mgr, &host, node).await,
        Some(RemediationPhase::Waiting) => waiting_phase(mgr, &host, node, is_node_forbidden).await,
        Some(RemediationPhase::Deleting) | Some(RemediationPhase::Failed) => {
            Ok(Action::await_change())
        }
        None => unreachable!("phase was initialized in step 7"),
    };

    #[cfg(feature = "metrics")]
    if let (Some(metrics), Ok(_)) = (&ctx.metrics, &action) {
        let phase_after = mgr.get_remediation_phase();
        if phase_before != phase_after {
            metrics.record_phase_transition(phase_before, phase_after);
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = ctx;

    action
}

/// Step 9, `Running` dispatch: finalizer, power-off, node backup/deletion.
async fn running_phase<A: ResourceAccessor>(
    mgr: &mut RemediationManager<A>,
    host: &BareMetalHost,
    node: Option<Node>,
) -> Result<Action> {
    if !mgr.has_finalizer() {
        mgr.set_finalizer();
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    if !mgr.is_power_off_requested(host) {
        mgr.set_power_off_annotation(host).await?;
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    if mgr.is_powered_on(host) {
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    if let Some(node) = node {
        let annotations_json =
            serde_json::to_string(node.metadata.annotations.as_ref().unwrap_or(&Default::default()))?;
        let labels_json =
            serde_json::to_string(node.metadata.labels.as_ref().unwrap_or(&Default::default()))?;

        if mgr.set_node_backup_annotations(&annotations_json, &labels_json) {
            return Ok(Action::requeue(Duration::from_secs(1)));
        }

        mgr.delete_node(&node).await?;
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    mgr.set_remediation_phase(RemediationPhase::Waiting);
    Ok(Action::requeue(Duration::from_secs(5)))
}

/// Step 9, `Waiting` dispatch: power-on, node restore, retry/escalation.
async fn waiting_phase<A: ResourceAccessor>(
    mgr: &mut RemediationManager<A>,
    host: &BareMetalHost,
    node: Option<Node>,
    is_node_forbidden: bool,
) -> Result<Action> {
    if mgr.is_power_off_requested(host) {
        mgr.remove_power_off_annotation(host).await?;
    }

    if !mgr.is_powered_on(host) {
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    if mgr.has_finalizer() {
        if let Some(mut node) = node {
            let (annotations_json, labels_json) = mgr.get_node_backup_annotations();
            restore_node(&mut node, &annotations_json, &labels_json);
            if let Err(e) = mgr.update_node(&node).await {
                warn!(error = %e, "failed to restore node, deferring to next reconcile");
            }
            mgr.remove_node_backup_annotations();
            mgr.unset_finalizer();
            return Ok(Action::requeue(Duration::from_secs(5)));
        } else if is_node_forbidden {
            mgr.unset_finalizer();
            return Ok(Action::requeue(Duration::from_secs(5)));
        }
    }

    let timeout = mgr.get_timeout().unwrap_or(Duration::from_secs(600));
    let timing = mgr.time_to_remediate(timeout);
    if !timing.expired {
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    if mgr.retry_limit_is_set() && !mgr.has_reach_retry_limit() {
        mgr.set_remediation_phase(RemediationPhase::Running);
        mgr.set_last_remediation_time();
        mgr.increase_retry_count();
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    if mgr.can_reprovision(host) {
        mgr.delete_machine().await?;
    }
    mgr.set_unhealthy_annotation(host).await?;
    mgr.set_remediation_phase(RemediationPhase::Deleting);
    Ok(Action::await_change())
}
