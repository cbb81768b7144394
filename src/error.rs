//! Error types for the remediation controller

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error (get/list/watch/create/update/patch/delete)
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Serialization/deserialization error for annotation payloads
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid controller configuration (flags, TLS material, CRD discovery)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Admission validation failure; carries the structured field errors
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Metal3Remediation has no ownerReference of kind Machine
    #[error("no owner reference with kind Machine found on {0}")]
    MissingOwnerRef(String),

    /// Machine is missing the metal3.io/BareMetalHost annotation
    #[error("unable to get {0} HostAnnotation")]
    MissingHostAnnotation(String),

    /// The annotated BareMetalHost could not be parsed as namespace/name
    #[error("invalid host annotation value {0}: expected namespace/name")]
    InvalidHostAnnotation(String),

    /// A finalizer-protected operation was attempted without a finalizer
    #[error("unable to set a PowerOff annotation, Host not found")]
    HostNotFound,

    /// The Machine's nodeRef is unset while a Node lookup was required
    #[error("metal3Remediation's node could not be retrieved, machine's nodeRef is nil")]
    MissingNodeRef,
}

pub type Result<T> = std::result::Result<T, Error>;

/// True if `err` wraps a Kubernetes 403 Forbidden response.
pub fn is_forbidden(err: &Error) -> bool {
    matches!(err, Error::KubeError(kube::Error::Api(r)) if r.code == 403)
}

/// True if `err` wraps a Kubernetes 404 Not Found response.
pub fn is_not_found(err: &Error) -> bool {
    matches!(err, Error::KubeError(kube::Error::Api(r)) if r.code == 404)
}

/// True if `err` wraps a Kubernetes 409 Conflict response (stale optimistic
/// concurrency write).
pub fn is_conflict(err: &Error) -> bool {
    matches!(err, Error::KubeError(kube::Error::Api(r)) if r.code == 409)
}
