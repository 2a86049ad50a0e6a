//! ledger-core - Core library for the ledger client
//!
//! This crate contains the entity models, the durable local store (mutation
//! queue, entity cache, conflict log), and the sync engine that replays
//! offline writes against the ledger API.

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;
pub mod wire;

pub use error::{Error, Result};
pub use models::{Entity, EntityId, EntityType};
