//! Version lifecycle for stored entities.
//!
//! Every entity starts at version 1. An update that changes at least one
//! domain field bumps the version by exactly one; an update that changes
//! nothing keeps it. Setting the version directly (data repair) never adds
//! an increment of its own.

use ledger_core::wire::is_server_managed;
use serde_json::{Map, Value};

pub const INITIAL_VERSION: i64 = 1;

/// Version assigned at creation. Explicit versions below 1 are ignored.
pub fn initial_version(explicit: Option<i64>) -> i64 {
    explicit
        .filter(|version| *version >= INITIAL_VERSION)
        .unwrap_or(INITIAL_VERSION)
}

/// What a write does to an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum VersionWrite {
    /// Merge domain fields; bumps the version if anything changed.
    FieldUpdate(Map<String, Value>),
    /// Repair path: set the version as given, fields untouched.
    ExplicitSet(i64),
}

/// Result of applying a write to the stored state.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionPlan {
    pub version: i64,
    pub fields: Map<String, Value>,
    pub changed: bool,
}

pub fn plan(stored_version: i64, stored_fields: &Map<String, Value>, write: VersionWrite) -> VersionPlan {
    match write {
        VersionWrite::FieldUpdate(patch) => {
            let mut fields = stored_fields.clone();
            let mut changed = false;
            for (key, value) in strip_managed(patch) {
                if fields.get(&key).unwrap_or(&Value::Null) != &value {
                    changed = true;
                    fields.insert(key, value);
                }
            }
            VersionPlan {
                version: if changed {
                    stored_version + 1
                } else {
                    stored_version
                },
                fields,
                changed,
            }
        }
        VersionWrite::ExplicitSet(version) => VersionPlan {
            version,
            fields: stored_fields.clone(),
            changed: version != stored_version,
        },
    }
}

/// Drop server-managed keys from a client payload.
pub fn strip_managed(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .filter(|(key, _)| !is_server_managed(key))
        .collect()
}
