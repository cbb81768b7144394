//! Resource Accessor
//!
//! Thin wrapper over the cluster API: typed get/update/delete plus a merge
//! patch. This is the only seam the Reconciliation Engine and Remediation
//! Manager use to reach the cluster, so tests can swap [`KubeAccessor`] for
//! an in-memory [`FakeAccessor`] (the same role `fake.NewClientBuilder()`
//! plays in the Go source this controller is modeled on).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::crd::{BareMetalHost, Machine, Metal3Remediation};
use crate::error::{is_not_found, Error, Result};

/// The cluster surface the Reconciliation Engine and Remediation Manager
/// depend on. All methods are idempotent under reconcile retry.
#[async_trait]
pub trait ResourceAccessor: Send + Sync {
    async fn get_remediation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Metal3Remediation>>;

    /// Commits a JSON merge patch against the Remediation's `metadata`
    /// (finalizers, annotations, labels) through the main-resource endpoint.
    /// `patch` must already be namespaced under the `metadata` key.
    async fn patch_remediation_metadata(&self, namespace: &str, name: &str, patch: Value) -> Result<()>;

    /// Commits a JSON merge patch against the Remediation's `status`
    /// subresource (`Metal3Remediation` declares `status =
    /// "Metal3RemediationStatus"`, so the main-resource PATCH endpoint
    /// silently drops `.status` content — this must go through the
    /// `/status` subresource). `patch` must already be namespaced under the
    /// `status` key.
    async fn patch_remediation_status(&self, namespace: &str, name: &str, patch: Value) -> Result<()>;

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>>;

    async fn delete_machine(&self, namespace: &str, name: &str) -> Result<()>;

    async fn get_host(&self, namespace: &str, name: &str) -> Result<Option<BareMetalHost>>;

    async fn patch_host(&self, namespace: &str, name: &str, patch: Value) -> Result<()>;

    /// `Ok(None)` means not found. `Err` with [`crate::error::is_forbidden`]
    /// true means RBAC denies node access; the engine degrades gracefully in
    /// that case rather than treating it as transient.
    async fn get_node(&self, name: &str) -> Result<Option<Node>>;

    async fn update_node(&self, node: &Node) -> Result<()>;

    async fn delete_node(&self, name: &str) -> Result<()>;
}

/// Production accessor backed by a real `kube::Client`.
#[derive(Clone)]
pub struct KubeAccessor {
    client: Client,
}

impl KubeAccessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceAccessor for KubeAccessor {
    async fn get_remediation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Metal3Remediation>> {
        let api: Api<Metal3Remediation> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if is_not_found(&Error::KubeError(kube_err_clone(&e))) => Ok(None),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn patch_remediation_metadata(&self, namespace: &str, name: &str, patch: Value) -> Result<()> {
        let api: Api<Metal3Remediation> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply("metal3-remediation-controller"),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn patch_remediation_status(&self, namespace: &str, name: &str, patch: Value) -> Result<()> {
        let api: Api<Metal3Remediation> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(
            name,
            &PatchParams::apply("metal3-remediation-controller"),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>> {
        let api: Api<Machine> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if is_not_found(&Error::KubeError(kube_err_clone(&e))) => Ok(None),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn delete_machine(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Machine> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &Default::default())
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn get_host(&self, namespace: &str, name: &str) -> Result<Option<BareMetalHost>> {
        let api: Api<BareMetalHost> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if is_not_found(&Error::KubeError(kube_err_clone(&e))) => Ok(None),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn patch_host(&self, namespace: &str, name: &str, patch: Value) -> Result<()> {
        let api: Api<BareMetalHost> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply("metal3-remediation-controller"),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if is_not_found(&Error::KubeError(kube_err_clone(&e))) => Ok(None),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn update_node(&self, node: &Node) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        let name = node.name_any();
        api.replace(&name, &Default::default(), node)
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.delete(name, &Default::default())
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }
}

/// `kube::Error` is not `Clone`; this helper only needs the HTTP status code
/// carried by `kube::Error::Api`, so it reconstructs the narrow subset the
/// error helpers inspect.
fn kube_err_clone(e: &kube::Error) -> kube::Error {
    match e {
        kube::Error::Api(r) => kube::Error::Api(kube::core::ErrorResponse {
            status: r.status.clone(),
            message: r.message.clone(),
            reason: r.reason.clone(),
            code: r.code,
        }),
        // Any non-Api variant is treated as transient/unknown by the error
        // helpers (they only match on `Error::Api`), so a generic stand-in
        // preserves that behaviour without requiring `Clone`.
        _ => kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: e.to_string(),
            reason: "Unknown".into(),
            code: 0,
        }),
    }
}

/// In-memory accessor for tests. Mirrors the Go source's use of
/// `fake.NewClientBuilder()`: objects live in maps keyed by
/// `namespace/name` (or bare `name` for cluster-scoped Nodes), and
/// not-found/forbidden are modeled explicitly rather than inferred.
#[derive(Default)]
pub struct FakeAccessor {
    pub remediations: Mutex<BTreeMap<String, Metal3Remediation>>,
    pub machines: Mutex<BTreeMap<String, Machine>>,
    pub hosts: Mutex<BTreeMap<String, BareMetalHost>>,
    pub nodes: Mutex<BTreeMap<String, Node>>,
    /// Node names that should surface as 403 Forbidden from `get_node`.
    pub forbidden_nodes: Mutex<Vec<String>>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

fn forbidden_error() -> Error {
    Error::KubeError(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".into(),
        message: "forbidden".into(),
        reason: "Forbidden".into(),
        code: 403,
    }))
}

impl FakeAccessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn seed_remediation(&self, namespace: &str, r: Metal3Remediation) {
        self.remediations
            .lock()
            .await
            .insert(key(namespace, &r.name_any()), r);
    }

    pub async fn seed_machine(&self, namespace: &str, m: Machine) {
        self.machines
            .lock()
            .await
            .insert(key(namespace, &m.name_any()), m);
    }

    pub async fn seed_host(&self, namespace: &str, h: BareMetalHost) {
        self.hosts.lock().await.insert(key(namespace, &h.name_any()), h);
    }

    pub async fn seed_node(&self, n: Node) {
        let name = n.name_any();
        self.nodes.lock().await.insert(name, n);
    }

    pub async fn mark_node_forbidden(&self, name: &str) {
        self.forbidden_nodes.lock().await.push(name.to_string());
    }
}

fn apply_merge(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target_map), Some(patch_map)) => {
            for (k, v) in patch_map {
                if v.is_null() {
                    target_map.remove(k);
                } else {
                    let entry = target_map.entry(k.clone()).or_insert(Value::Null);
                    apply_merge(entry, v);
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

#[async_trait]
impl ResourceAccessor for FakeAccessor {
    async fn get_remediation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Metal3Remediation>> {
        Ok(self.remediations.lock().await.get(&key(namespace, name)).cloned())
    }

    async fn patch_remediation_metadata(&self, namespace: &str, name: &str, patch: Value) -> Result<()> {
        let mut guard = self.remediations.lock().await;
        let Some(obj) = guard.get_mut(&key(namespace, name)) else {
            return Ok(());
        };
        let mut value = serde_json::to_value(&*obj)?;
        apply_merge(&mut value, &patch);
        *obj = serde_json::from_value(value)?;
        Ok(())
    }

    async fn patch_remediation_status(&self, namespace: &str, name: &str, patch: Value) -> Result<()> {
        let mut guard = self.remediations.lock().await;
        let Some(obj) = guard.get_mut(&key(namespace, name)) else {
            return Ok(());
        };
        let mut value = serde_json::to_value(&*obj)?;
        apply_merge(&mut value, &patch);
        *obj = serde_json::from_value(value)?;
        Ok(())
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>> {
        Ok(self.machines.lock().await.get(&key(namespace, name)).cloned())
    }

    async fn delete_machine(&self, namespace: &str, name: &str) -> Result<()> {
        self.machines.lock().await.remove(&key(namespace, name));
        Ok(())
    }

    async fn get_host(&self, namespace: &str, name: &str) -> Result<Option<BareMetalHost>> {
        Ok(self.hosts.lock().await.get(&key(namespace, name)).cloned())
    }

    async fn patch_host(&self, namespace: &str, name: &str, patch: Value) -> Result<()> {
        let mut guard = self.hosts.lock().await;
        let Some(obj) = guard.get_mut(&key(namespace, name)) else {
            return Ok(());
        };
        let mut value = serde_json::to_value(&*obj)?;
        apply_merge(&mut value, &patch);
        *obj = serde_json::from_value(value)?;
        Ok(())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        if self.forbidden_nodes.lock().await.iter().any(|n| n == name) {
            return Err(forbidden_error());
        }
        Ok(self.nodes.lock().await.get(name).cloned())
    }

    async fn update_node(&self, node: &Node) -> Result<()> {
        self.nodes.lock().await.insert(node.name_any(), node.clone());
        Ok(())
    }

    async fn delete_node(&self, name: &str) -> Result<()> {
        self.nodes.lock().await.remove(name);
        Ok(())
    }
}
