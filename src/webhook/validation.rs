//! Admission Validator
//!
//! Pure functions validating `Metal3Remediation` / `Metal3RemediationTemplate`
//! payloads on create/update (spec.md §4.1). Ported from
//! `original_source/pkg/webhook/metal3remediation_webhook.go` and
//! `metal3remediationtemplate_webhook.go`: no I/O, no cluster access —
//! these are called directly by unit tests and by the admission server.

use serde_json::json;

use crate::crd::{Metal3RemediationSpec, RemediationStrategy, REBOOT_REMEDIATION_STRATEGY};

use super::types::{ValidationError, ValidationErrors};

/// Minimum accepted `strategy.timeout`, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 100;
/// Minimum accepted `strategy.retryLimit`.
pub const MIN_RETRY_LIMIT: i32 = 1;
/// Default `strategy.timeout` applied to templates whose `timeout` is unset.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Validates a `Metal3RemediationSpec` regardless of whether it arrived
/// directly on a Remediation or via a Template. Returns every violation
/// found, not just the first, matching `apierrors.NewInvalid`'s
/// multi-cause field list.
pub fn validate_remediation_spec(spec: &Metal3RemediationSpec) -> ValidationErrors {
    let mut errors = Vec::new();
    validate_strategy(&spec.strategy, &mut errors);
    errors
}

fn validate_strategy(strategy: &RemediationStrategy, errors: &mut ValidationErrors) {
    if strategy.type_ != REBOOT_REMEDIATION_STRATEGY {
        errors.push(ValidationError::new(
            "spec.strategy.type",
            json!(strategy.type_),
            format!("must equal \"{REBOOT_REMEDIATION_STRATEGY}\", the only supported strategy kind"),
        ));
    }

    if let Some(timeout) = &strategy.timeout {
        match crate::crd::parse_go_duration(timeout) {
            Some(d) if d.as_secs() >= MIN_TIMEOUT_SECS => {}
            Some(_) => errors.push(ValidationError::new(
                "spec.strategy.timeout",
                json!(timeout),
                format!("must be >= {MIN_TIMEOUT_SECS}s"),
            )),
            None => errors.push(ValidationError::new(
                "spec.strategy.timeout",
                json!(timeout),
                "must be a valid duration string",
            )),
        }
    }

    if strategy.retry_limit < MIN_RETRY_LIMIT {
        errors.push(ValidationError::new(
            "spec.strategy.retryLimit",
            json!(strategy.retry_limit),
            format!("must be >= {MIN_RETRY_LIMIT}"),
        ));
    }
}

/// Validates a `Metal3Remediation` on create/update. Delete admission is
/// always permitted and never reaches this function.
pub fn validate_remediation(spec: &Metal3RemediationSpec) -> ValidationErrors {
    validate_remediation_spec(spec)
}

/// Validates a `Metal3RemediationTemplate`'s embedded spec, using the same
/// rules as a standalone Remediation.
pub fn validate_remediation_template(spec: &Metal3RemediationSpec) -> ValidationErrors {
    validate_remediation_spec(spec)
}
