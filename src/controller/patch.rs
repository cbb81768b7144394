//! Patch Helper
//!
//! Replaces `sigs.k8s.io/cluster-api/util/patch.Helper` from the Go source:
//! snapshot an object before mutating it in memory, then diff the snapshot
//! against the current value to produce the minimal JSON merge patch:
//! `metadata` (finalizers, annotations, labels) and `status` are patched as
//! two independent subresource writes, same as the original.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Snapshot of an object's `metadata` and `status` fields, taken before the
/// caller mutates its in-memory copy.
pub struct PatchHelper {
    before_metadata: Value,
    before_status: Value,
}

impl PatchHelper {
    /// Captures `metadata` and `status` of `obj` as they are right now.
    pub fn snapshot<T: Serialize>(obj: &T) -> Result<Self> {
        let full = serde_json::to_value(obj)?;
        Ok(Self {
            before_metadata: full.get("metadata").cloned().unwrap_or(Value::Null),
            before_status: full.get("status").cloned().unwrap_or(Value::Null),
        })
    }

    /// Diffs `obj`'s current `metadata`/`status` against the snapshot and
    /// returns `(metadata_patch, status_patch)`, each `None` when that
    /// subresource did not change. Patches are RFC 7396 JSON merge patches:
    /// removed keys are carried as explicit `null`s so the apply-side merge
    /// deletes them rather than leaving them untouched.
    pub fn diff<T: Serialize>(&self, obj: &T) -> Result<(Option<Value>, Option<Value>)> {
        let full = serde_json::to_value(obj)?;
        let after_metadata = full.get("metadata").cloned().unwrap_or(Value::Null);
        let after_status = full.get("status").cloned().unwrap_or(Value::Null);

        let metadata_patch = merge_diff(&self.before_metadata, &after_metadata);
        let status_patch = merge_diff(&self.before_status, &after_status);
        Ok((metadata_patch, status_patch))
    }
}

/// Returns a merge patch that turns `before` into `after`, or `None` if they
/// are already equal. Keys present in `before` but absent in `after` are
/// carried over as explicit JSON `null`.
fn merge_diff(before: &Value, after: &Value) -> Option<Value> {
    if before == after {
        return None;
    }
    match (before.as_object(), after.as_object()) {
        (Some(b), Some(a)) => {
            let mut patch = serde_json::Map::new();
            for (k, av) in a {
                match b.get(k) {
                    Some(bv) if bv == av => {}
                    Some(bv) => match merge_diff(bv, av) {
                        Some(sub) => {
                            patch.insert(k.clone(), sub);
                        }
                        None => {}
                    },
                    None => {
                        patch.insert(k.clone(), av.clone());
                    }
                }
            }
            for k in b.keys() {
                if !a.contains_key(k) {
                    patch.insert(k.clone(), Value::Null);
                }
            }
            if patch.is_empty() {
                None
            } else {
                Some(Value::Object(patch))
            }
        }
        _ => Some(after.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Fixture {
        metadata: Value,
        status: Value,
    }

    #[test]
    fn no_changes_produce_no_patch() {
        let obj = Fixture {
            metadata: json!({"finalizers": ["metal3-remediation"]}),
            status: json!({"phase": "Running"}),
        };
        let helper = PatchHelper::snapshot(&obj).unwrap();
        let (m, s) = helper.diff(&obj).unwrap();
        assert!(m.is_none());
        assert!(s.is_none());
    }

    #[test]
    fn changed_field_produces_minimal_patch() {
        let before = Fixture {
            metadata: json!({"annotations": {"a": "1"}}),
            status: json!({"phase": "Running", "retryCount": 0}),
        };
        let helper = PatchHelper::snapshot(&before).unwrap();
        let after = Fixture {
            metadata: json!({"annotations": {"a": "1"}}),
            status: json!({"phase": "Waiting", "retryCount": 0}),
        };
        let (m, s) = helper.diff(&after).unwrap();
        assert!(m.is_none());
        assert_eq!(s.unwrap(), json!({"phase": "Waiting"}));
    }

    #[test]
    fn removed_key_is_patched_to_null() {
        let before = Fixture {
            metadata: json!({"annotations": {"a": "1", "b": "2"}}),
            status: json!({}),
        };
        let helper = PatchHelper::snapshot(&before).unwrap();
        let after = Fixture {
            metadata: json!({"annotations": {"a": "1"}}),
            status: json!({}),
        };
        let (m, _s) = helper.diff(&after).unwrap();
        let m = m.unwrap();
        assert_eq!(m["annotations"]["b"], Value::Null);
        assert!(m["annotations"].get("a").is_none());
    }
}
