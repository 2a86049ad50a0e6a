use std::path::Path;

use crate::commands::common::{
    build_orchestrator, format_sync_conflict_lines, open_store, resolve_settings,
    sync_conflict_to_item, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(api_url: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    let settings = resolve_settings(api_url)?;
    let orchestrator = build_orchestrator(db_path, settings).await?;

    let result = orchestrator.full_sync().await;
    if !result.success {
        return Err(CliError::SyncIncomplete(result.message));
    }

    println!("{}", result.message);
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
