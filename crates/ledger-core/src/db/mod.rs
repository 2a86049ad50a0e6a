//! Local database layer: queue, cache, conflict log, and settings

mod cache_repository;
mod conflict_repository;
mod connection;
mod migrations;
mod queue_repository;
mod settings_repository;

pub use cache_repository::{CacheRepository, SqliteCacheRepository};
pub use conflict_repository::{ConflictRepository, SqliteConflictRepository};
pub use connection::Database;
pub use queue_repository::{QueueRepository, SqliteQueueRepository};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
