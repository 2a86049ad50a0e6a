use std::path::Path;

use ledger_core::models::MutationAction;
use ledger_core::{EntityId, EntityType};

use crate::commands::common::{build_entity, open_store, parse_entity_id, parse_fields};
use crate::error::CliError;

pub async fn run_add(
    entity_type: EntityType,
    json: &str,
    id: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let fields = parse_fields(json)?;
    let id = id.map_or_else(|| Ok(EntityId::new()), parse_entity_id)?;
    let entity = build_entity(entity_type, id, fields, None)?;

    let store = open_store(db_path)?;
    let mutation = store
        .enqueue(entity_type, MutationAction::Create, &entity)
        .await?;

    tracing::debug!(mutation_id = mutation.id, "Queued create");
    println!("{}", entity.id());
    Ok(())
}
