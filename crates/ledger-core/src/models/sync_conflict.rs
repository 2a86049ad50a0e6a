//! Sync conflict model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EntityId, EntityType};

/// Outcome chosen by the conflict resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Server state replaces the local change
    UseServer,
    /// Local version is ahead of the server; leave the mutation queued
    Retry,
}

impl ResolutionAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UseServer => "use_server",
            Self::Retry => "retry",
        }
    }
}

/// Version mismatch detected while replaying a mutation.
///
/// Lives only for the duration of one resolution; the audit trail is kept as
/// a [`SyncConflict`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub local_version: i64,
    pub server_version: i64,
    pub local_data: Value,
    pub server_data: Value,
}

/// Recorded sync conflict resolved by the server-wins policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    /// Version the local change was based on
    pub local_version: i64,
    /// Version held by the server when the change was rejected
    pub server_version: i64,
    /// The losing local change
    pub local_data: Value,
    /// The winning server state
    pub server_data: Value,
    pub resolution: ResolutionAction,
    pub reason: String,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
}
