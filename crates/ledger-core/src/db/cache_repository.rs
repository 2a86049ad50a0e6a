//! Read-through entity cache repository

use crate::error::{Error, Result};
use crate::models::{Entity, EntityId, EntityType};
use crate::util::unix_millis_now;
use rusqlite::{params, Connection, OptionalExtension};

/// Trait for local entity snapshot storage
pub trait CacheRepository {
    /// Upsert snapshots of one entity type
    fn cache_write(&self, entity_type: EntityType, entities: &[Entity]) -> Result<usize>;

    /// Replace every snapshot of one entity type with a fresh server listing
    fn cache_replace(&self, entity_type: EntityType, entities: &[Entity]) -> Result<usize>;

    /// Drop a snapshot, e.g. after a confirmed delete
    fn cache_remove(&self, entity_type: EntityType, id: &EntityId) -> Result<()>;

    /// All snapshots of one entity type
    fn cached_entities(&self, entity_type: EntityType) -> Result<Vec<Entity>>;

    /// One snapshot, if cached
    fn cached_entity(&self, entity_type: EntityType, id: &EntityId) -> Result<Option<Entity>>;
}

/// `SQLite` implementation of `CacheRepository`
pub struct SqliteCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl CacheRepository for SqliteCacheRepository<'_> {
    fn cache_write(&self, entity_type: EntityType, entities: &[Entity]) -> Result<usize> {
        ensure_type(entity_type, entities)?;

        let tx = self.conn.unchecked_transaction()?;
        insert_snapshots(&tx, entity_type, entities)?;
        tx.commit()?;

        Ok(entities.len())
    }

    fn cache_replace(&self, entity_type: EntityType, entities: &[Entity]) -> Result<usize> {
        ensure_type(entity_type, entities)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM cached_entities WHERE entity_type = ?",
            [entity_type.as_str()],
        )?;
        insert_snapshots(&tx, entity_type, entities)?;
        tx.commit()?;

        Ok(entities.len())
    }

    fn cache_remove(&self, entity_type: EntityType, id: &EntityId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM cached_entities WHERE entity_type = ? AND entity_id = ?",
            params![entity_type.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    fn cached_entities(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM cached_entities WHERE entity_type = ? ORDER BY entity_id ASC",
        )?;

        let rows = stmt
            .query_map([entity_type.as_str()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(Error::from))
            .collect()
    }

    fn cached_entity(&self, entity_type: EntityType, id: &EntityId) -> Result<Option<Entity>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM cached_entities WHERE entity_type = ? AND entity_id = ?",
                params![entity_type.as_str(), id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|data| serde_json::from_str(&data).map_err(Error::from))
            .transpose()
    }
}

fn ensure_type(entity_type: EntityType, entities: &[Entity]) -> Result<()> {
    match entities
        .iter()
        .find(|entity| entity.entity_type() != entity_type)
    {
        Some(mismatch) => Err(Error::InvalidInput(format!(
            "Cannot cache a {} as {entity_type}",
            mismatch.entity_type()
        ))),
        None => Ok(()),
    }
}

fn insert_snapshots(conn: &Connection, entity_type: EntityType, entities: &[Entity]) -> Result<()> {
    let cached_at = unix_millis_now();
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO cached_entities (entity_type, entity_id, version, data, cached_at)
         VALUES (?, ?, ?, ?, ?)",
    )?;
    for entity in entities {
        stmt.execute(params![
            entity_type.as_str(),
            entity.id().as_str(),
            entity.version(),
            serde_json::to_string(entity)?,
            cached_at
        ])?;
    }
    Ok(())
}
