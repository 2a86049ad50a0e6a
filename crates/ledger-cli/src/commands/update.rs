use std::path::Path;

use ledger_core::models::MutationAction;
use ledger_core::EntityType;

use crate::commands::common::{
    build_entity, latest_local_copy, open_store, parse_entity_id, parse_fields,
};
use crate::error::CliError;

pub async fn run_update(
    entity_type: EntityType,
    id: &str,
    json: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let entity_id = parse_entity_id(id)?;
    let changes = parse_fields(json)?;

    let store = open_store(db_path)?;
    let base = latest_local_copy(&store, entity_type, &entity_id)
        .await?
        .ok_or_else(|| CliError::UnknownEntity {
            entity_type,
            id: entity_id.to_string(),
        })?;

    let mut fields = base.to_fields()?;
    fields.extend(changes);
    fields.remove("version");
    let entity = build_entity(entity_type, entity_id, fields, base.version())?;

    let mutation = store
        .enqueue(entity_type, MutationAction::Update, &entity)
        .await?;

    tracing::debug!(mutation_id = mutation.id, "Queued update");
    println!("{entity_id}");
    Ok(())
}
