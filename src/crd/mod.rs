//! Custom Resource Definitions for the remediation controller
//!
//! This module defines the typed Kubernetes resources the Reconciliation
//! Engine reads and writes: the `Metal3Remediation` / `Metal3RemediationTemplate`
//! CRDs this controller owns, plus the subset of `Machine` and
//! `BareMetalHost` fields it needs from their respective external owners.

pub mod host;
pub mod machine;
pub mod remediation;
pub mod remediation_template;


pub use host::{BareMetalHost, BareMetalHostSpec, BareMetalHostStatus};
pub use machine::{Machine, MachineSpec, MachineStatus, NodeRef};
pub use remediation::{
    parse_go_duration, Metal3Remediation, Metal3RemediationSpec, Metal3RemediationStatus,
    RemediationPhase, RemediationStrategy, HOST_ANNOTATION, MACHINE_ROLE_LABEL,
    MACHINE_ROLE_MASTER, NODE_ANNOTATIONS_BACKUP_ANNOTATION, NODE_LABELS_BACKUP_ANNOTATION,
    REBOOT_REMEDIATION_STRATEGY, REMEDIATION_FINALIZER, UNHEALTHY_ANNOTATION,
    UNHEALTHY_ANNOTATION_VALUE,
};
pub use remediation_template::{
    Metal3RemediationTemplate, Metal3RemediationTemplateResource, Metal3RemediationTemplateSpec,
};
