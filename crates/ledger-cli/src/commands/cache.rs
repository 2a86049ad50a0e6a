use std::path::Path;

use ledger_core::EntityType;

use crate::commands::common::{format_entity_lines, open_store};
use crate::error::CliError;

pub async fn run_cache(entity_type: EntityType, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let entities = store.cached_entities(entity_type).await?;

    if as_json {
        let json_items = entities
            .iter()
            .map(ledger_core::Entity::to_fields)
            .collect::<Result<Vec<_>, _>>()?;
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entities.is_empty() {
        println!(
            "No cached {}. Run `ledger sync` to refresh.",
            entity_type.collection_path()
        );
        return Ok(());
    }

    for line in format_entity_lines(&entities)? {
        println!("{line}");
    }
    Ok(())
}
