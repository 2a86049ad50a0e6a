//! Sync conflict audit log repository

use crate::error::{Error, Result};
use crate::models::{ConflictRecord, ResolutionAction, SyncConflict};
use crate::util::unix_millis_now;
use rusqlite::{params, Connection};

/// Trait for persisting resolved conflicts
pub trait ConflictRepository {
    /// Append a resolved conflict to the audit log
    fn record_conflict(
        &self,
        record: &ConflictRecord,
        resolution: ResolutionAction,
        reason: &str,
    ) -> Result<SyncConflict>;

    /// Most recent conflicts first
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

struct ConflictRow {
    id: i64,
    entity_type: String,
    entity_id: String,
    local_version: i64,
    server_version: i64,
    local_data: String,
    server_data: String,
    resolution: String,
    reason: String,
    resolved_at: i64,
}

impl ConflictRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            local_version: row.get(3)?,
            server_version: row.get(4)?,
            local_data: row.get(5)?,
            server_data: row.get(6)?,
            resolution: row.get(7)?,
            reason: row.get(8)?,
            resolved_at: row.get(9)?,
        })
    }

    fn into_conflict(self) -> Result<SyncConflict> {
        let entity_id = self.entity_id.parse().map_err(|_| {
            Error::Database(format!("Invalid entity id in conflict log: {}", self.entity_id))
        })?;
        let resolution = match self.resolution.as_str() {
            "use_server" => ResolutionAction::UseServer,
            "retry" => ResolutionAction::Retry,
            other => {
                return Err(Error::Database(format!(
                    "Unknown conflict resolution: {other}"
                )))
            }
        };

        Ok(SyncConflict {
            id: self.id,
            entity_type: self.entity_type.parse()?,
            entity_id,
            local_version: self.local_version,
            server_version: self.server_version,
            local_data: serde_json::from_str(&self.local_data)?,
            server_data: serde_json::from_str(&self.server_data)?,
            resolution,
            reason: self.reason,
            resolved_at: self.resolved_at,
        })
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn record_conflict(
        &self,
        record: &ConflictRecord,
        resolution: ResolutionAction,
        reason: &str,
    ) -> Result<SyncConflict> {
        let resolved_at = unix_millis_now();
        self.conn.execute(
            "INSERT INTO sync_conflicts
                (entity_type, entity_id, local_version, server_version, local_data, server_data, resolution, reason, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.entity_type.as_str(),
                record.entity_id.as_str(),
                record.local_version,
                record.server_version,
                record.local_data.to_string(),
                record.server_data.to_string(),
                resolution.as_str(),
                reason,
                resolved_at
            ],
        )?;

        Ok(SyncConflict {
            id: self.conn.last_insert_rowid(),
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            local_version: record.local_version,
            server_version: record.server_version,
            local_data: record.local_data.clone(),
            server_data: record.server_data.clone(),
            resolution,
            reason: reason.to_string(),
            resolved_at,
        })
    }

    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_type, entity_id, local_version, server_version, local_data, server_data, resolution, reason, resolved_at
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?",
        )?;

        let rows = stmt
            .query_map([limit], ConflictRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(ConflictRow::into_conflict).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{EntityId, EntityType};
    use serde_json::json;

    fn record(server_version: i64) -> ConflictRecord {
        ConflictRecord {
            entity_type: EntityType::Supplier,
            entity_id: EntityId::new(),
            local_version: 2,
            server_version,
            local_data: json!({ "name": "Local" }),
            server_data: json!({ "name": "Server", "version": server_version }),
        }
    }

    #[test]
    fn test_record_and_list_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteConflictRepository::new(db.connection());

        let first = repo
            .record_conflict(&record(3), ResolutionAction::UseServer, "server newer")
            .unwrap();
        let second = repo
            .record_conflict(&record(2), ResolutionAction::UseServer, "same version")
            .unwrap();

        let listed = repo.list_conflicts(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1], first);
        assert_eq!(listed[1].server_data["name"], "Server");
    }

    #[test]
    fn test_list_conflicts_respects_limit() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteConflictRepository::new(db.connection());

        for version in 3..6 {
            repo.record_conflict(&record(version), ResolutionAction::UseServer, "server newer")
                .unwrap();
        }

        assert_eq!(repo.list_conflicts(2).unwrap().len(), 2);
    }
}
