use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ledger_core::EntityType;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "Record ledger changes offline and sync them when the server is reachable")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Ledger API base URL (overrides LEDGER_API_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue creation of a new entity
    #[command(alias = "new")]
    Add {
        /// Entity type (supplier, product, rate, collection, payment)
        entity_type: EntityType,
        /// Entity fields as a JSON object
        json: String,
        /// Use this ID instead of generating one
        #[arg(long, value_name = "UUID")]
        id: Option<String>,
    },
    /// Queue an update; fields are merged over the latest local copy
    #[command(alias = "edit")]
    Update {
        /// Entity type
        entity_type: EntityType,
        /// Entity ID
        id: String,
        /// Changed fields as a JSON object
        json: String,
    },
    /// Queue deletion of an entity
    Delete {
        /// Entity type
        entity_type: EntityType,
        /// Entity ID
        id: String,
    },
    /// List mutations waiting to be synced
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push pending mutations to the server and refresh the local cache
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Show cached server state for an entity type
    Cache {
        /// Entity type
        entity_type: EntityType,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe the server and sync each time it becomes reachable
    Watch {
        /// Seconds between reachability probes
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..=3600))]
        interval_secs: u64,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
