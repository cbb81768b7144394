//! Mutating Admission Webhook Logic
//!
//! Defaulting for `Metal3RemediationTemplate` (spec.md §4.1). `Default` on
//! a `Metal3Remediation` itself is a no-op and is not implemented here.

use crate::crd::{Metal3RemediationTemplateSpec, REBOOT_REMEDIATION_STRATEGY};

use super::validation::{DEFAULT_TIMEOUT_SECS, MIN_RETRY_LIMIT};

/// Applies template-path defaulting in place: empty `type` -> `Reboot`,
/// unset `timeout` -> `600s`, `retryLimit` below the minimum -> `1`.
/// Returns whether anything changed.
pub fn default_remediation_template(spec: &mut Metal3RemediationTemplateSpec) -> bool {
    let strategy = &mut spec.template.spec.strategy;
    let mut changed = false;

    if strategy.type_.is_empty() {
        strategy.type_ = REBOOT_REMEDIATION_STRATEGY.to_string();
        changed = true;
    }

    if strategy.timeout.is_none() {
        strategy.timeout = Some(format!("{DEFAULT_TIMEOUT_SECS}s"));
        changed = true;
    }

    if strategy.retry_limit < MIN_RETRY_LIMIT {
        strategy.retry_limit = MIN_RETRY_LIMIT;
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Metal3RemediationSpec, Metal3RemediationTemplateResource, RemediationStrategy};

    fn template(type_: &str, timeout: Option<&str>, retry_limit: i32) -> Metal3RemediationTemplateSpec {
        Metal3RemediationTemplateSpec {
            template: Metal3RemediationTemplateResource {
                spec: Metal3RemediationSpec {
                    strategy: RemediationStrategy {
                        type_: type_.to_string(),
                        timeout: timeout.map(str::to_string),
                        retry_limit,
                    },
                },
            },
        }
    }

    #[test]
    fn empty_type_defaults_to_reboot() {
        let mut t = template("", Some("600s"), 1);
        assert!(default_remediation_template(&mut t));
        assert_eq!(t.template.spec.strategy.type_, "Reboot");
    }

    #[test]
    fn unset_timeout_defaults_to_600s() {
        let mut t = template("Reboot", None, 1);
        assert!(default_remediation_template(&mut t));
        assert_eq!(t.template.spec.strategy.timeout.as_deref(), Some("600s"));
    }

    #[test]
    fn sub_minimum_retry_limit_defaults_to_one() {
        let mut t = template("Reboot", Some("600s"), 0);
        assert!(default_remediation_template(&mut t));
        assert_eq!(t.template.spec.strategy.retry_limit, 1);
    }

    #[test]
    fn fully_specified_template_is_unchanged() {
        let mut t = template("Reboot", Some("600s"), 3);
        assert!(!default_remediation_template(&mut t));
        assert_eq!(t.template.spec.strategy.retry_limit, 3);
    }
}
