//! Admission error shape
//!
//! Matches cluster-API admission conventions (spec.md §6): a list of
//! `{fieldPath, badValue, detail}` entries, surfaced with `reason =
//! "Invalid"`.

use serde::Serialize;
use serde_json::Value;

/// One rejected field from `validate_remediation` / `validate_remediation_template`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ValidationError {
    pub field_path: String,
    pub bad_value: Value,
    pub detail: String,
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, bad_value: Value, detail: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            bad_value,
            detail: detail.into(),
        }
    }

    /// Rendered the way `apierrors.NewInvalid` would join multiple causes
    /// into a single human-readable message.
    pub fn message(&self) -> String {
        format!("{}: {}", self.field_path, self.detail)
    }
}

/// Outcome of a validation pass: empty means admitted.
pub type ValidationErrors = Vec<ValidationError>;
