//! Admission Validator and webhook transport
//!
//! Pure validation/defaulting (`validation`, `mutation`) plus the `axum` +
//! `rustls` TLS server (`server`) that exposes them as Kubernetes
//! admission webhooks (spec.md §4.1, §6).

pub mod mutation;
pub mod server;
pub mod types;
pub mod validation;

pub use mutation::default_remediation_template;
pub use server::run_server;
pub use types::{ValidationError, ValidationErrors};
pub use validation::{validate_remediation, validate_remediation_template};
