use std::path::Path;

use ledger_core::models::MutationAction;
use ledger_core::EntityType;

use crate::commands::common::{latest_local_copy, open_store, parse_entity_id};
use crate::error::CliError;

pub async fn run_delete(entity_type: EntityType, id: &str, db_path: &Path) -> Result<(), CliError> {
    let entity_id = parse_entity_id(id)?;

    let store = open_store(db_path)?;
    let snapshot = latest_local_copy(&store, entity_type, &entity_id)
        .await?
        .ok_or_else(|| CliError::UnknownEntity {
            entity_type,
            id: entity_id.to_string(),
        })?;

    store
        .enqueue(entity_type, MutationAction::Delete, &snapshot)
        .await?;

    println!("Queued delete of {entity_type} {entity_id}");
    Ok(())
}
