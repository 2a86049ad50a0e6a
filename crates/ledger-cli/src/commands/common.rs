use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ledger_core::config::SyncSettings;
use ledger_core::identity::DeviceIdentity;
use ledger_core::models::{MutationAction, PendingMutation, SyncConflict};
use ledger_core::services::LedgerStore;
use ledger_core::sync::{HttpTransport, SyncOrchestrator};
use ledger_core::util::compact_text;
use ledger_core::wire::is_server_managed;
use ledger_core::{Entity, EntityId, EntityType};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub enqueued_at: i64,
    pub enqueued_at_iso: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub local_version: i64,
    pub server_version: i64,
    pub resolution: String,
    pub reason: String,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("LEDGER_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("ledger").join("ledger.db"))
        .ok_or(CliError::NoDataDir)
}

pub fn open_store(db_path: &Path) -> Result<LedgerStore, CliError> {
    Ok(LedgerStore::open_path(db_path)?)
}

/// Environment settings with the `--api-url` flag applied on top.
pub fn resolve_settings(api_url: Option<&str>) -> Result<SyncSettings, CliError> {
    let settings = SyncSettings::from_env()?;
    match api_url {
        Some(url) => Ok(settings.with_api_base_url(url)?),
        None => Ok(settings),
    }
}

pub async fn build_orchestrator(
    db_path: &Path,
    settings: SyncSettings,
) -> Result<SyncOrchestrator<HttpTransport>, CliError> {
    let base_url = settings.require_api_base_url()?;
    let transport = HttpTransport::new(base_url, settings.request_timeout)?;

    let store = open_store(db_path)?;
    let identity = DeviceIdentity::load_or_create(&store).await?;

    Ok(SyncOrchestrator::new(store, transport, identity)
        .with_retry(settings.retry)
        .with_cache_types(settings.cache_types))
}

/// Parse a JSON object of entity fields, dropping server-managed keys.
pub fn parse_fields(json: &str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(fields) => Ok(fields
            .into_iter()
            .filter(|(key, _)| !is_server_managed(key))
            .collect()),
        _ => Err(CliError::FieldsNotObject),
    }
}

pub fn parse_entity_id(id: &str) -> Result<EntityId, CliError> {
    id.trim()
        .parse()
        .map_err(|_| CliError::InvalidId(id.trim().to_string()))
}

/// Build an entity from user fields and reject it early if it would fail
/// the sync validation gate.
pub fn build_entity(
    entity_type: EntityType,
    id: EntityId,
    mut fields: Map<String, Value>,
    version: Option<i64>,
) -> Result<Entity, CliError> {
    fields.insert("id".to_string(), Value::String(id.as_str()));
    let mut entity = Entity::from_fields(entity_type, Value::Object(fields))?;
    entity.set_version(version);
    entity
        .validate()
        .map_err(|problems| CliError::Validation {
            entity_type,
            problems,
        })?;
    Ok(entity)
}

/// The newest local view of an entity: the latest queued payload, else the cache.
///
/// An entity whose latest queued change is a delete has no local copy.
pub async fn latest_local_copy(
    store: &LedgerStore,
    entity_type: EntityType,
    id: &EntityId,
) -> Result<Option<Entity>, CliError> {
    let queued = store
        .list_pending()
        .await?
        .into_iter()
        .rev()
        .find(|mutation| mutation.entity_type == entity_type && mutation.entity_id == *id);

    if let Some(mutation) = queued {
        if mutation.action == MutationAction::Delete {
            return Ok(None);
        }
        return Ok(Some(mutation.payload));
    }
    Ok(store.cached_entity(entity_type, id).await?)
}

pub fn pending_to_item(mutation: &PendingMutation) -> PendingItem {
    PendingItem {
        id: mutation.id,
        entity_type: mutation.entity_type.to_string(),
        entity_id: mutation.entity_id.to_string(),
        action: mutation.action.to_string(),
        enqueued_at: mutation.enqueued_at,
        enqueued_at_iso: format_sync_timestamp(mutation.enqueued_at),
        attempts: mutation.attempts,
        last_error: mutation.last_error.clone(),
    }
}

pub fn format_pending_lines(pending: &[PendingMutation]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    pending
        .iter()
        .map(|mutation| {
            let id = mutation.entity_id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let age = format_relative_time(mutation.enqueued_at, now_ms);
            let line = format!(
                "#{:<5} {:<6}  {:<10}  {short_id:<13}  {age}",
                mutation.id,
                mutation.action.as_str(),
                mutation.entity_type.as_str()
            );
            match &mutation.last_error {
                Some(error) => format!(
                    "{line}  [{} failed: {}]",
                    mutation.attempts,
                    compact_text(error)
                ),
                None => line,
            }
        })
        .collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        entity_type: conflict.entity_type.to_string(),
        entity_id: conflict.entity_id.to_string(),
        local_version: conflict.local_version,
        server_version: conflict.server_version,
        resolution: conflict.resolution.as_str().to_string(),
        reason: conflict.reason.clone(),
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<10}  {} {}  local=v{} server=v{}  {}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.resolution.as_str(),
                conflict.entity_type,
                conflict.entity_id,
                conflict.local_version,
                conflict.server_version,
                conflict.reason
            )
        })
        .collect()
}

/// One line per cached entity: id, version, then a compact field summary.
pub fn format_entity_lines(entities: &[Entity]) -> Result<Vec<String>, CliError> {
    entities
        .iter()
        .map(|entity| {
            let fields = entity
                .to_fields()?
                .into_iter()
                .filter(|(key, value)| !is_server_managed(key) && !value.is_null())
                .map(|(key, value)| match value {
                    Value::String(text) => format!("{key}={text}"),
                    other => format!("{key}={other}"),
                })
                .collect::<Vec<_>>()
                .join(" ");
            let version = entity
                .version()
                .map_or_else(|| "v?".to_string(), |version| format!("v{version}"));
            Ok(format!("{}  {version:<4}  {}", entity.id(), compact_text(&fields)))
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}
