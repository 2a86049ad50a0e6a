//! Pending mutation model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Entity, EntityId, EntityType};
use crate::error::{Error, Result};

/// Kind of write recorded in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("Unknown mutation action: {other}"))),
        }
    }
}

/// A local write awaiting server confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// Local queue row identifier
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub action: MutationAction,
    /// Entity snapshot taken when the mutation was recorded
    pub payload: Entity,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    pub synced: bool,
    /// Failed dispatch passes so far
    pub attempts: u32,
    pub last_error: Option<String>,
}
