//! Ledger CLI - record ledger changes offline and sync them later
//!
//! Every write lands in the local queue first; `ledger sync` (or `ledger watch`)
//! replays the queue against the ledger API.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::cache::run_cache;
use crate::commands::common::resolve_db_path;
use crate::commands::delete::run_delete;
use crate::commands::pending::run_pending;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::commands::update::run_update;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "ledger_cli=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let api_url = cli.api_url.as_deref();

    match cli.command {
        Commands::Add {
            entity_type,
            json,
            id,
        } => run_add(entity_type, &json, id.as_deref(), &db_path).await?,
        Commands::Update {
            entity_type,
            id,
            json,
        } => run_update(entity_type, &id, &json, &db_path).await?,
        Commands::Delete { entity_type, id } => run_delete(entity_type, &id, &db_path).await?,
        Commands::Pending { json } => run_pending(json, &db_path).await?,
        Commands::Sync { command } => match command {
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &db_path).await?;
            }
            None => run_sync(api_url, &db_path).await?,
        },
        Commands::Cache { entity_type, json } => run_cache(entity_type, json, &db_path).await?,
        Commands::Watch { interval_secs } => run_watch(interval_secs, api_url, &db_path).await?,
    }

    Ok(())
}
