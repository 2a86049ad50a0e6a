//! Pending mutation queue repository

use crate::error::{Error, Result};
use crate::models::{Entity, EntityType, MutationAction, PendingMutation};
use crate::util::unix_millis_now;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for durable mutation queue operations
pub trait QueueRepository {
    /// Append a mutation; it is on disk when this returns
    fn enqueue(
        &self,
        entity_type: EntityType,
        action: MutationAction,
        payload: &Entity,
    ) -> Result<PendingMutation>;

    /// Unsynced mutations, oldest first; rows that no longer decode are skipped
    fn list_pending(&self) -> Result<Vec<PendingMutation>>;

    /// Get a mutation by its queue ID, synced or not
    fn get(&self, id: i64) -> Result<Option<PendingMutation>>;

    /// Mark a mutation as acknowledged by the server (idempotent)
    fn mark_synced(&self, id: i64) -> Result<()>;

    /// Record a failed dispatch attempt for a mutation
    fn record_failure(&self, id: i64, error: &str) -> Result<()>;

    /// Delete every synced mutation, returning how many were removed
    fn purge_synced(&self) -> Result<usize>;

    /// Number of unsynced mutations
    fn pending_count(&self) -> Result<usize>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, entity_type, entity_id, action, payload, enqueued_at, synced, attempts, last_error
     FROM pending_mutations";

/// Raw queue row before typed decoding
struct PendingRow {
    id: i64,
    entity_type: String,
    entity_id: String,
    action: String,
    payload: String,
    enqueued_at: i64,
    synced: bool,
    attempts: u32,
    last_error: Option<String>,
}

impl PendingRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            action: row.get(3)?,
            payload: row.get(4)?,
            enqueued_at: row.get(5)?,
            synced: row.get::<_, i32>(6)? != 0,
            attempts: row.get(7)?,
            last_error: row.get(8)?,
        })
    }

    fn into_mutation(self) -> Result<PendingMutation> {
        let entity_id = self
            .entity_id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid entity id in queue: {}", self.entity_id)))?;

        Ok(PendingMutation {
            id: self.id,
            entity_type: self.entity_type.parse()?,
            entity_id,
            action: self.action.parse()?,
            payload: serde_json::from_str(&self.payload)?,
            enqueued_at: self.enqueued_at,
            synced: self.synced,
            attempts: self.attempts,
            last_error: self.last_error,
        })
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn enqueue(
        &self,
        entity_type: EntityType,
        action: MutationAction,
        payload: &Entity,
    ) -> Result<PendingMutation> {
        if payload.entity_type() != entity_type {
            return Err(Error::InvalidInput(format!(
                "Payload is a {} but the mutation targets {entity_type}",
                payload.entity_type()
            )));
        }

        let enqueued_at = unix_millis_now();
        let serialized = serde_json::to_string(payload)?;

        self.conn.execute(
            "INSERT INTO pending_mutations (entity_type, entity_id, action, payload, enqueued_at, synced, attempts)
             VALUES (?, ?, ?, ?, ?, 0, 0)",
            params![
                entity_type.as_str(),
                payload.id().as_str(),
                action.as_str(),
                serialized,
                enqueued_at
            ],
        )?;

        Ok(PendingMutation {
            id: self.conn.last_insert_rowid(),
            entity_type,
            entity_id: payload.id(),
            action,
            payload: payload.clone(),
            enqueued_at,
            synced: false,
            attempts: 0,
            last_error: None,
        })
    }

    fn list_pending(&self) -> Result<Vec<PendingMutation>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE synced = 0 ORDER BY enqueued_at ASC, id ASC"
        ))?;

        let rows = stmt
            .query_map([], PendingRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match row.into_mutation() {
                    Ok(mutation) => Some(mutation),
                    Err(error) => {
                        tracing::warn!(mutation_id = id, "Skipping undecodable queued mutation: {error}");
                        None
                    }
                }
            })
            .collect())
    }

    fn get(&self, id: i64) -> Result<Option<PendingMutation>> {
        let row = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?"),
                params![id],
                PendingRow::from_row,
            )
            .optional()?;

        row.map(PendingRow::into_mutation).transpose()
    }

    fn mark_synced(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE pending_mutations SET synced = 1 WHERE id = ?",
            params![id],
        )?;
        Ok(())
    }

    fn record_failure(&self, id: i64, error: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE pending_mutations SET attempts = attempts + 1, last_error = ? WHERE id = ? AND synced = 0",
            params![error, id],
        )?;
        Ok(())
    }

    fn purge_synced(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM pending_mutations WHERE synced = 1", [])?;
        Ok(removed)
    }

    fn pending_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_mutations WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
