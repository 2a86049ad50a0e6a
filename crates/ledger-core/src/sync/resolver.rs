//! Server-wins conflict resolution.

use std::cmp::Ordering;

use serde_json::Value;

use crate::models::{ConflictRecord, ResolutionAction};

/// Decision for one conflicting mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub action: ResolutionAction,
    /// Data to cache when the server wins.
    pub resolved_data: Option<Value>,
    pub reason: &'static str,
}

/// Resolve a version conflict. Pure: same record, same answer.
///
/// The server wins whenever its version is at least the local one. A local
/// version ahead of the server cannot happen under the versioning protocol,
/// so it is reported as `Retry` and left for the caller to log.
pub fn resolve(record: &ConflictRecord) -> Resolution {
    match record.server_version.cmp(&record.local_version) {
        Ordering::Greater => Resolution {
            action: ResolutionAction::UseServer,
            resolved_data: Some(record.server_data.clone()),
            reason: "server version is newer",
        },
        Ordering::Equal => Resolution {
            action: ResolutionAction::UseServer,
            resolved_data: Some(record.server_data.clone()),
            reason: "versions equal, server state wins",
        },
        Ordering::Less => Resolution {
            action: ResolutionAction::Retry,
            resolved_data: None,
            reason: "local version ahead of server",
        },
    }
}
