//! HTTP server for the ledger: versioned entity storage behind a REST API

pub mod config;
pub mod error;
pub mod guard;
pub mod routes;
pub mod store;
pub mod versioning;
