use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ledger_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Entity fields must be a JSON object")]
    FieldsNotObject,
    #[error("Invalid entity ID: {0}")]
    InvalidId(String),
    #[error("Invalid {entity_type}: {}", problems.join(", "))]
    Validation {
        entity_type: ledger_core::EntityType,
        problems: Vec<String>,
    },
    #[error("No local copy of {entity_type} {id}; run `ledger sync` to refresh the cache first")]
    UnknownEntity {
        entity_type: ledger_core::EntityType,
        id: String,
    },
    #[error("Could not resolve a data directory; pass --db-path or set LEDGER_DB_PATH")]
    NoDataDir,
    #[error("{0}")]
    SyncIncomplete(String),
}
