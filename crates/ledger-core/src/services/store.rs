//! Thread-safe wrapper around the local database used by sync and the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    CacheRepository, ConflictRepository, Database, QueueRepository, SettingsRepository,
    SqliteCacheRepository, SqliteConflictRepository, SqliteQueueRepository,
    SqliteSettingsRepository,
};
use crate::models::{
    ConflictRecord, Entity, EntityId, EntityType, MutationAction, PendingMutation,
    ResolutionAction, SyncConflict,
};
use crate::Result;

/// Async handle to the local queue, cache, and conflict log.
///
/// Each call takes the lock for one repository operation only, so callers
/// never hold it across a network request.
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LedgerStore {
    /// Open a store at the given filesystem path, creating parent directories.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&db_path)?;
        tracing::debug!("Opened ledger store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Record a local write in the durable queue.
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        action: MutationAction,
        payload: &Entity,
    ) -> Result<PendingMutation> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).enqueue(entity_type, action, payload)
    }

    /// Unsynced mutations in FIFO order.
    pub async fn list_pending(&self) -> Result<Vec<PendingMutation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).list_pending()
    }

    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).pending_count()
    }

    pub async fn get_mutation(&self, id: i64) -> Result<Option<PendingMutation>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).get(id)
    }

    pub async fn mark_synced(&self, id: i64) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).mark_synced(id)
    }

    pub async fn record_failure(&self, id: i64, error: &str) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).record_failure(id, error)
    }

    pub async fn purge_synced(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).purge_synced()
    }

    /// Upsert entity snapshots of one type.
    pub async fn cache_write(&self, entity_type: EntityType, entities: &[Entity]) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).cache_write(entity_type, entities)
    }

    /// Swap the cached set of one type for a full server listing.
    pub async fn cache_replace(&self, entity_type: EntityType, entities: &[Entity]) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).cache_replace(entity_type, entities)
    }

    pub async fn cache_remove(&self, entity_type: EntityType, id: &EntityId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).cache_remove(entity_type, id)
    }

    pub async fn cached_entities(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).cached_entities(entity_type)
    }

    pub async fn cached_entity(
        &self,
        entity_type: EntityType,
        id: &EntityId,
    ) -> Result<Option<Entity>> {
        let db = self.db.lock().await;
        SqliteCacheRepository::new(db.connection()).cached_entity(entity_type, id)
    }

    /// Append a resolved conflict to the audit log.
    pub async fn record_conflict(
        &self,
        record: &ConflictRecord,
        resolution: ResolutionAction,
        reason: &str,
    ) -> Result<SyncConflict> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).record_conflict(record, resolution, reason)
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).list_conflicts(limit)
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).get_setting(key)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).set_setting(key, value)
    }
}
