//! Lease-based leader election
//!
//! Out of scope for reconcile correctness (spec.md §1), but must be a real,
//! wired subsystem rather than a stub: leader election at the process
//! level guarantees at most one process reconciles cluster-wide (spec.md
//! §5). Implemented against `coordination.k8s.io/v1 Lease`, the same
//! primitive `kube_runtime`'s own leader-election helper and upstream
//! controller-runtime build on.

use std::time::Duration;

use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{info, warn};

use crate::error::Result;

/// Configuration for the lease-based election, mirroring the
/// `--leader-elect*` flags in `crate::config::Config`.
#[derive(Clone, Debug)]
pub struct LeaderElectionConfig {
    pub enabled: bool,
    pub resource_namespace: String,
    pub lease_name: String,
    pub identity: String,
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
}

impl LeaderElectionConfig {
    pub fn new(resource_namespace: String, identity: String) -> Self {
        Self {
            enabled: true,
            resource_namespace,
            lease_name: "metal3-remediation-controller-leader".to_string(),
            identity,
            lease_duration: Duration::from_secs(120),
            renew_deadline: Duration::from_secs(110),
            retry_period: Duration::from_secs(20),
        }
    }
}

/// Blocks until this process acquires (or renews into) the lease, then
/// returns. Callers loop: `acquire_or_wait` then do one unit of leadership
/// work, then call it again before the lease's renew deadline.
///
/// When leader election is disabled this returns immediately — the caller
/// is assumed to be the sole replica (e.g. local development).
pub async fn acquire_or_wait(client: &Client, cfg: &LeaderElectionConfig) -> Result<()> {
    if !cfg.enabled {
        return Ok(());
    }

    let api: Api<Lease> = Api::namespaced(client.clone(), &cfg.resource_namespace);

    loop {
        match api.get(&cfg.lease_name).await {
            Ok(lease) => {
                if is_held_by_other_and_fresh(&lease, cfg) {
                    tokio::time::sleep(cfg.retry_period).await;
                    continue;
                }
                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": cfg.identity,
                        "leaseDurationSeconds": cfg.lease_duration.as_secs(),
                        "renewTime": serde_json::Value::Null,
                        "acquireTime": serde_json::Value::Null,
                    }
                });
                if let Err(e) = api
                    .patch(&cfg.lease_name, &PatchParams::apply("metal3-remediation-controller"), &Patch::Merge(&patch))
                    .await
                {
                    warn!(error = %e, "failed to acquire lease, retrying");
                    tokio::time::sleep(cfg.retry_period).await;
                    continue;
                }
                info!(identity = %cfg.identity, "acquired leader lease");
                return Ok(());
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                let lease = Lease {
                    metadata: kube::api::ObjectMeta {
                        name: Some(cfg.lease_name.clone()),
                        namespace: Some(cfg.resource_namespace.clone()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(cfg.identity.clone()),
                        lease_duration_seconds: Some(cfg.lease_duration.as_secs() as i32),
                        ..Default::default()
                    }),
                };
                match api.create(&PostParams::default(), &lease).await {
                    Ok(created) => {
                        info!(identity = %created.name_any(), "created and acquired leader lease");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to create lease, retrying");
                        tokio::time::sleep(cfg.retry_period).await;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read lease, retrying");
                tokio::time::sleep(cfg.retry_period).await;
            }
        }
    }
}

/// True if the lease is held by a different identity and has not yet
/// exceeded its duration past the last renew time.
fn is_held_by_other_and_fresh(lease: &Lease, cfg: &LeaderElectionConfig) -> bool {
    let Some(spec) = lease.spec.as_ref() else { return false };
    let held_by_other = spec
        .holder_identity
        .as_deref()
        .is_some_and(|h| h != cfg.identity);
    if !held_by_other {
        return false;
    }
    let Some(renew) = spec.renew_time.as_ref().map(micro_time_to_chrono) else {
        return false;
    };
    let duration = spec
        .lease_duration_seconds
        .map(|s| Duration::from_secs(s.max(0) as u64))
        .unwrap_or(cfg.lease_duration);
    let age = (chrono::Utc::now() - renew).to_std().unwrap_or(Duration::ZERO);
    age < duration
}

fn micro_time_to_chrono(t: &MicroTime) -> chrono::DateTime<chrono::Utc> {
    t.0
}
