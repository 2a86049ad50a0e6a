//! Versioned entity storage for the API server.
//!
//! Each write runs in a `BEGIN IMMEDIATE` transaction on a single connection
//! guarded by an async mutex, and the final `UPDATE` is conditional on the
//! version that was read. Two writers starting from the same version can
//! never both succeed.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use ledger_core::models::{Entity, EntityId, EntityType};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::guard::{self, VersionedBody};
use crate::versioning::{self, VersionWrite};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("version conflict: client={client_version}, server={server_version}")]
    Conflict {
        client_version: i64,
        server_version: i64,
        current: Box<StoredEntity>,
    },
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One row of the `entities` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub entity_type: EntityType,
    pub id: String,
    pub version: i64,
    pub fields: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted: bool,
}

impl StoredEntity {
    /// Wire representation: domain fields plus `id`, `version`, and timestamps.
    pub fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("version".to_string(), Value::from(self.version));
        object.insert(
            "created_at".to_string(),
            Value::String(self.created_at.clone()),
        );
        object.insert(
            "updated_at".to_string(),
            Value::String(self.updated_at.clone()),
        );
        Value::Object(object)
    }
}

/// Row as read, before the JSON `data` column is decoded.
struct RawRow {
    id: String,
    version: i64,
    data: String,
    created_at: String,
    updated_at: String,
    deleted: bool,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            data: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted: row.get::<_, i32>(5)? != 0,
        })
    }

    fn into_entity(self, entity_type: EntityType) -> StoreResult<StoredEntity> {
        Ok(StoredEntity {
            entity_type,
            id: self.id,
            version: self.version,
            fields: serde_json::from_str(&self.data)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted: self.deleted,
        })
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS entities (
        entity_type TEXT NOT NULL,
        id TEXT NOT NULL,
        version INTEGER NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0,
        last_client_id TEXT,
        PRIMARY KEY (entity_type, id)
    );
    CREATE INDEX IF NOT EXISTS idx_entities_live
        ON entities(entity_type, deleted, created_at);
";

const SELECT_COLUMNS: &str =
    "SELECT id, version, data, created_at, updated_at, deleted FROM entities";

#[derive(Clone)]
pub struct EntityStore {
    conn: Arc<Mutex<Connection>>,
}

impl EntityStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a new entity. Re-posting an existing id returns the stored row
    /// unchanged with `created = false`.
    pub async fn create(
        &self,
        entity_type: EntityType,
        body: VersionedBody,
    ) -> StoreResult<(StoredEntity, bool)> {
        let id = match body.id.as_deref() {
            Some(raw) => raw
                .parse::<EntityId>()
                .map_err(|_| StoreError::Invalid(format!("id must be a UUID, got {raw}")))?,
            None => EntityId::new(),
        };

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = load(&tx, entity_type, &id.as_str())? {
            tx.commit()?;
            return Ok((existing, false));
        }

        validate(entity_type, &id.as_str(), &body.fields)?;

        let now = Utc::now().to_rfc3339();
        let entity = StoredEntity {
            entity_type,
            id: id.as_str(),
            version: versioning::initial_version(body.client_version),
            fields: body.fields,
            created_at: now.clone(),
            updated_at: now,
            deleted: false,
        };
        tx.execute(
            "INSERT INTO entities (entity_type, id, version, data, created_at, updated_at, deleted, last_client_id)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
            params![
                entity_type.as_str(),
                entity.id,
                entity.version,
                serde_json::to_string(&entity.fields)?,
                entity.created_at,
                entity.updated_at,
                body.client_id
            ],
        )?;
        tx.commit()?;

        Ok((entity, true))
    }

    /// Apply a field update guarded by the client's version.
    pub async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        body: VersionedBody,
    ) -> StoreResult<StoredEntity> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = load_live(&tx, entity_type, id)?;
        if let Err(conflict) = guard::check(body.client_version, stored.version) {
            return Err(StoreError::Conflict {
                client_version: conflict.client_version,
                server_version: conflict.server_version,
                current: Box::new(stored),
            });
        }

        let plan = versioning::plan(
            stored.version,
            &stored.fields,
            VersionWrite::FieldUpdate(body.fields),
        );
        if !plan.changed {
            tx.commit()?;
            return Ok(stored);
        }
        validate(entity_type, id, &plan.fields)?;

        let updated_at = Utc::now().to_rfc3339();
        let updated = tx.execute(
            "UPDATE entities SET data = ?, version = ?, updated_at = ?, last_client_id = ?
             WHERE entity_type = ? AND id = ? AND version = ?",
            params![
                serde_json::to_string(&plan.fields)?,
                plan.version,
                updated_at,
                body.client_id,
                entity_type.as_str(),
                id,
                stored.version
            ],
        )?;
        if updated == 0 {
            let current = load_live(&tx, entity_type, id)?;
            return Err(StoreError::Conflict {
                client_version: stored.version,
                server_version: current.version,
                current: Box::new(current),
            });
        }
        tx.commit()?;

        Ok(StoredEntity {
            version: plan.version,
            fields: plan.fields,
            updated_at,
            ..stored
        })
    }

    /// Soft delete; the tombstone keeps its row with the version bumped.
    pub async fn delete(&self, entity_type: EntityType, id: &str) -> StoreResult<StoredEntity> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = load_live(&tx, entity_type, id)?;
        let updated_at = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE entities SET deleted = 1, version = version + 1, updated_at = ?
             WHERE entity_type = ? AND id = ? AND version = ?",
            params![updated_at, entity_type.as_str(), id, stored.version],
        )?;
        tx.commit()?;

        Ok(StoredEntity {
            version: stored.version + 1,
            updated_at,
            deleted: true,
            ..stored
        })
    }

    /// Data repair: set the version directly without touching fields.
    pub async fn repair_version(
        &self,
        entity_type: EntityType,
        id: &str,
        version: i64,
    ) -> StoreResult<StoredEntity> {
        if version < versioning::INITIAL_VERSION {
            return Err(StoreError::Invalid("version must be >= 1".to_string()));
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = load(&tx, entity_type, id)?
            .ok_or_else(|| StoreError::NotFound(format!("{entity_type} {id}")))?;
        let plan = versioning::plan(
            stored.version,
            &stored.fields,
            VersionWrite::ExplicitSet(version),
        );
        tx.execute(
            "UPDATE entities SET version = ? WHERE entity_type = ? AND id = ?",
            params![plan.version, entity_type.as_str(), id],
        )?;
        tx.commit()?;
        tracing::warn!(
            entity_type = %entity_type,
            id,
            from = stored.version,
            to = plan.version,
            "Entity version repaired"
        );

        Ok(StoredEntity {
            version: plan.version,
            ..stored
        })
    }

    /// Live (non-deleted) entity by id.
    pub async fn get(&self, entity_type: EntityType, id: &str) -> StoreResult<Option<StoredEntity>> {
        let conn = self.conn.lock().await;
        Ok(load(&conn, entity_type, id)?.filter(|entity| !entity.deleted))
    }

    /// Live entities of one type, oldest first.
    pub async fn list(&self, entity_type: EntityType) -> StoreResult<Vec<StoredEntity>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE entity_type = ? AND deleted = 0 ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map([entity_type.as_str()], RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|row| row.into_entity(entity_type))
            .collect()
    }
}

fn load(conn: &Connection, entity_type: EntityType, id: &str) -> StoreResult<Option<StoredEntity>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE entity_type = ? AND id = ?"),
        params![entity_type.as_str(), id],
        RawRow::from_row,
    )
    .optional()?
    .map(|row| row.into_entity(entity_type))
    .transpose()
}

fn load_live(tx: &Transaction<'_>, entity_type: EntityType, id: &str) -> StoreResult<StoredEntity> {
    load(tx, entity_type, id)?
        .filter(|entity| !entity.deleted)
        .ok_or_else(|| StoreError::NotFound(format!("{entity_type} {id}")))
}

/// Reject states that are not a complete entity of this type.
fn validate(entity_type: EntityType, id: &str, fields: &Map<String, Value>) -> StoreResult<()> {
    let mut object = fields.clone();
    object.insert("id".to_string(), Value::String(id.to_string()));
    let entity = Entity::from_fields(entity_type, Value::Object(object))
        .map_err(|error| StoreError::Invalid(error.to_string()))?;
    entity
        .validate()
        .map_err(|problems| StoreError::Invalid(problems.join(", ")))
}
