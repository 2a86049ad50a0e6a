//! Transport abstraction between the orchestrator and the ledger API.

use std::future::Future;

use serde_json::{Map, Value};

use super::error::SyncResult;
use crate::models::{EntityId, EntityType, MutationAction};

/// One mutation ready to send: domain fields plus version metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub action: MutationAction,
    pub body: Map<String, Value>,
}

/// Network layer used by the sync orchestrator.
///
/// Implemented over HTTP by [`super::HttpTransport`]; tests substitute a
/// scripted fake.
pub trait LedgerTransport: Send + Sync {
    /// Send one mutation; returns the server's entity state on success.
    fn dispatch(
        &self,
        request: &MutationRequest,
    ) -> impl Future<Output = SyncResult<Value>> + Send;

    /// Fetch all live entities of one type.
    fn fetch_all(
        &self,
        entity_type: EntityType,
    ) -> impl Future<Output = SyncResult<Vec<Value>>> + Send;

    /// Cheap health probe.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}
