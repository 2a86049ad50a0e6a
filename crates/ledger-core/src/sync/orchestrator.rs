//! Replays the pending mutation queue against the ledger API.
//!
//! One orchestrator owns the "a pass is running" flag. Both trigger paths
//! (explicit sync and connectivity restore) go through [`SyncOrchestrator::sync_pending`],
//! which refuses to start a second pass while one is active.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;

use super::error::{SyncError, SyncResult};
use super::resolver::resolve;
use super::retry::RetryPolicy;
use super::transport::{LedgerTransport, MutationRequest};
use crate::identity::DeviceIdentity;
use crate::models::{
    ConflictRecord, Entity, EntityId, EntityType, MutationAction, PendingMutation,
    ResolutionAction,
};
use crate::services::LedgerStore;
use crate::state::SyncState;

/// Entity types refreshed after every pass unless configured otherwise.
pub const DEFAULT_CACHE_TYPES: [EntityType; 2] = [EntityType::Supplier, EntityType::Product];

/// Counters for one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    /// Mutations dropped in favour of server state
    pub conflicts: usize,
    pub last_error: Option<String>,
    pub cache_refreshed: bool,
    pub purged: usize,
    pub duration: Duration,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        let mut message = format!(
            "Synced {}, failed {}, conflicts {}",
            self.synced, self.failed, self.conflicts
        );
        if !self.cache_refreshed {
            message.push_str(" (cache refresh incomplete)");
        }
        if let Some(error) = &self.last_error {
            message.push_str(&format!("; last error: {error}"));
        }
        message
    }
}

/// Result of asking for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was active; nothing was done.
    AlreadySyncing,
}

/// User-facing wrapper around [`SyncOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullSyncResult {
    pub success: bool,
    pub message: String,
    pub report: Option<SyncReport>,
}

/// Marks a pass as active until dropped.
#[must_use]
pub struct SyncPassGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for SyncPassGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

enum ItemOutcome {
    Synced,
    ServerWon,
}

/// Version each entity is sent with for the rest of a pass.
type VersionMap = HashMap<(EntityType, EntityId), i64>;

/// Local writes after a server-acknowledged dispatch get one extra attempt.
const LOCAL_STORE_ATTEMPTS: u32 = 2;

/// Drives the local queue to the server, one mutation at a time.
pub struct SyncOrchestrator<T> {
    store: LedgerStore,
    transport: T,
    identity: DeviceIdentity,
    retry: RetryPolicy,
    cache_types: Vec<EntityType>,
    running: AtomicBool,
}

impl<T: LedgerTransport> SyncOrchestrator<T> {
    pub fn new(store: LedgerStore, transport: T, identity: DeviceIdentity) -> Self {
        Self {
            store,
            transport,
            identity,
            retry: RetryPolicy::default(),
            cache_types: DEFAULT_CACHE_TYPES.to_vec(),
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_cache_types(mut self, cache_types: Vec<EntityType>) -> Self {
        self.cache_types = cache_types;
        self
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub const fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SyncState {
        if self.is_running() {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Claim the pass flag, or `None` if a pass is already active.
    pub fn try_start(&self) -> Option<SyncPassGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncPassGuard {
                running: &self.running,
            })
    }

    /// Run one pass over the queue, then refresh caches.
    pub async fn sync_pending(&self) -> crate::Result<SyncOutcome> {
        let Some(_guard) = self.try_start() else {
            tracing::debug!("Sync requested while a pass is active; skipping");
            return Ok(SyncOutcome::AlreadySyncing);
        };

        let started = Instant::now();
        let pending = self.store.list_pending().await?;
        tracing::info!("Starting sync pass with {} pending mutations", pending.len());

        let mut report = SyncReport::default();
        let mut advanced = VersionMap::new();

        for mutation in &pending {
            match self.process_mutation(mutation, &mut advanced).await {
                Ok(ItemOutcome::Synced) => report.synced += 1,
                Ok(ItemOutcome::ServerWon) => report.conflicts += 1,
                Err(error) => {
                    let message = error.to_string();
                    tracing::warn!(
                        mutation_id = mutation.id,
                        entity_type = %mutation.entity_type,
                        entity_id = %mutation.entity_id,
                        action = %mutation.action,
                        "Mutation left pending: {message}"
                    );
                    if let Err(store_error) = self.store.record_failure(mutation.id, &message).await
                    {
                        tracing::warn!(
                            mutation_id = mutation.id,
                            "Failed to record mutation failure: {store_error}"
                        );
                    }
                    report.failed += 1;
                    report.last_error = Some(message);
                }
            }
        }

        match self.store.purge_synced().await {
            Ok(purged) => report.purged = purged,
            Err(error) => tracing::warn!("Failed to purge synced mutations: {error}"),
        }

        report.cache_refreshed = self.refresh_caches().await;
        report.duration = started.elapsed();

        tracing::info!(
            synced = report.synced,
            failed = report.failed,
            conflicts = report.conflicts,
            "Sync pass finished in {:?}",
            report.duration
        );
        Ok(SyncOutcome::Completed(report))
    }

    /// Run a pass and describe the result for display.
    pub async fn full_sync(&self) -> FullSyncResult {
        match self.sync_pending().await {
            Ok(SyncOutcome::Completed(report)) => FullSyncResult {
                success: report.failed == 0,
                message: report.summary(),
                report: Some(report),
            },
            Ok(SyncOutcome::AlreadySyncing) => FullSyncResult {
                success: false,
                message: "Sync already in progress".to_string(),
                report: None,
            },
            Err(error) => FullSyncResult {
                success: false,
                message: format!("Sync failed: {error}"),
                report: None,
            },
        }
    }

    async fn process_mutation(
        &self,
        mutation: &PendingMutation,
        advanced: &mut VersionMap,
    ) -> SyncResult<ItemOutcome> {
        mutation.payload.validate().map_err(SyncError::Validation)?;

        let version = self.known_version(mutation, advanced).await?;
        let request = self.build_request(mutation, version)?;

        match self.dispatch_with_retry(&request, mutation.id).await {
            Ok(server_data) => {
                let version =
                    retry_local(mutation.id, || self.settle(mutation, &server_data)).await?;
                if let Some(version) = version {
                    advanced.insert((mutation.entity_type, mutation.entity_id), version);
                }
                Ok(ItemOutcome::Synced)
            }
            Err(SyncError::NotFound(_)) if mutation.action == MutationAction::Delete => {
                tracing::debug!(
                    mutation_id = mutation.id,
                    entity_id = %mutation.entity_id,
                    "Entity already gone on server"
                );
                retry_local(mutation.id, || self.settle_gone(mutation)).await?;
                Ok(ItemOutcome::Synced)
            }
            Err(SyncError::Conflict {
                client_version,
                server_version,
                current_data,
            }) => {
                let record = ConflictRecord {
                    entity_type: mutation.entity_type,
                    entity_id: mutation.entity_id,
                    local_version: client_version.or(version).unwrap_or_default(),
                    server_version,
                    local_data: Value::Object(mutation.payload.to_fields()?),
                    server_data: current_data,
                };
                self.handle_conflict(mutation, record, advanced).await
            }
            Err(error) => Err(error),
        }
    }

    /// Version to send: what this pass already learned about the entity first,
    /// then the payload, then the cache.
    async fn known_version(
        &self,
        mutation: &PendingMutation,
        advanced: &VersionMap,
    ) -> SyncResult<Option<i64>> {
        if let Some(version) = advanced.get(&(mutation.entity_type, mutation.entity_id)) {
            return Ok(Some(*version));
        }
        if let Some(version) = mutation.payload.version() {
            return Ok(Some(version));
        }
        if mutation.action == MutationAction::Create {
            return Ok(None);
        }

        let cached = self
            .store
            .cached_entity(mutation.entity_type, &mutation.entity_id)
            .await?;
        Ok(cached.and_then(|entity| entity.version()))
    }

    fn build_request(
        &self,
        mutation: &PendingMutation,
        version: Option<i64>,
    ) -> SyncResult<MutationRequest> {
        let mut body = mutation.payload.to_fields()?;
        body.insert(
            "version".to_string(),
            version.map_or(Value::Null, Value::from),
        );
        body.insert(
            "sync_timestamp".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        body.insert(
            "client_id".to_string(),
            Value::String(self.identity.client_id().to_string()),
        );

        Ok(MutationRequest {
            entity_type: mutation.entity_type,
            entity_id: mutation.entity_id,
            action: mutation.action,
            body,
        })
    }

    async fn dispatch_with_retry(
        &self,
        request: &MutationRequest,
        mutation_id: i64,
    ) -> SyncResult<Value> {
        let mut attempt: u32 = 0;
        loop {
            let error = match self.transport.dispatch(request).await {
                Ok(data) => return Ok(data),
                Err(error) => error,
            };

            attempt += 1;
            let gone = request.action == MutationAction::Delete
                && matches!(error, SyncError::NotFound(_));
            if gone || attempt >= self.retry.attempts_for(error.class()) {
                return Err(error);
            }

            let delay = self.retry.delay_for_attempt(attempt - 1);
            tracing::warn!(
                mutation_id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Dispatch failed, retrying: {error}"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Cache the server's copy and mark the mutation synced.
    ///
    /// Returns the version the server assigned, if it reported one.
    async fn settle(
        &self,
        mutation: &PendingMutation,
        server_data: &Value,
    ) -> SyncResult<Option<i64>> {
        let version = if mutation.action == MutationAction::Delete {
            self.store
                .cache_remove(mutation.entity_type, &mutation.entity_id)
                .await?;
            server_data.get("version").and_then(Value::as_i64)
        } else {
            match Entity::from_fields(mutation.entity_type, server_data.clone()) {
                Ok(entity) => {
                    self.store
                        .cache_write(mutation.entity_type, std::slice::from_ref(&entity))
                        .await?;
                    entity.version()
                }
                Err(error) => {
                    tracing::warn!(
                        mutation_id = mutation.id,
                        entity_type = %mutation.entity_type,
                        "Server accepted mutation but returned an unreadable entity: {error}"
                    );
                    None
                }
            }
        };

        self.store.mark_synced(mutation.id).await?;
        Ok(version)
    }

    async fn settle_gone(&self, mutation: &PendingMutation) -> SyncResult<()> {
        self.store
            .cache_remove(mutation.entity_type, &mutation.entity_id)
            .await?;
        self.store.mark_synced(mutation.id).await?;
        Ok(())
    }

    async fn handle_conflict(
        &self,
        mutation: &PendingMutation,
        record: ConflictRecord,
        advanced: &mut VersionMap,
    ) -> SyncResult<ItemOutcome> {
        let resolution = resolve(&record);

        match resolution.action {
            ResolutionAction::UseServer => {
                let server_data = resolution
                    .resolved_data
                    .clone()
                    .unwrap_or_else(|| record.server_data.clone());
                // Later writes in this pass were built on the losing edit.
                advanced.insert(
                    (record.entity_type, record.entity_id),
                    record.local_version,
                );
                match Entity::from_fields(record.entity_type, server_data) {
                    Ok(entity) => {
                        self.store
                            .cache_write(record.entity_type, std::slice::from_ref(&entity))
                            .await?;
                    }
                    Err(error) => tracing::warn!(
                        entity_id = %record.entity_id,
                        "Conflict server state is not a valid {}: {error}",
                        record.entity_type
                    ),
                }
                self.store
                    .record_conflict(&record, resolution.action, resolution.reason)
                    .await?;
                self.store.mark_synced(mutation.id).await?;

                tracing::warn!(
                    mutation_id = mutation.id,
                    entity_type = %record.entity_type,
                    entity_id = %record.entity_id,
                    local_version = record.local_version,
                    server_version = record.server_version,
                    local_data = %record.local_data,
                    server_data = %record.server_data,
                    "Conflict resolved with server state: {}",
                    resolution.reason
                );
                Ok(ItemOutcome::ServerWon)
            }
            ResolutionAction::Retry => {
                tracing::error!(
                    mutation_id = mutation.id,
                    entity_type = %record.entity_type,
                    entity_id = %record.entity_id,
                    local_version = record.local_version,
                    server_version = record.server_version,
                    "Invariant violated: {}",
                    resolution.reason
                );
                Err(SyncError::Conflict {
                    client_version: Some(record.local_version),
                    server_version: record.server_version,
                    current_data: record.server_data,
                })
            }
        }
    }

    /// Pull fresh snapshots for the configured entity types.
    ///
    /// Returns false if any type could not be refreshed.
    async fn refresh_caches(&self) -> bool {
        let mut complete = true;
        for entity_type in &self.cache_types {
            match self.refresh_cache(*entity_type).await {
                Ok(count) => {
                    tracing::debug!("Refreshed {count} cached {}", entity_type.collection_path());
                }
                Err(error) => {
                    complete = false;
                    tracing::warn!(
                        entity_type = %entity_type,
                        "Cache refresh failed: {error}"
                    );
                }
            }
        }
        complete
    }

    async fn refresh_cache(&self, entity_type: EntityType) -> SyncResult<usize> {
        let items = self.transport.fetch_all(entity_type).await?;
        let entities: Vec<Entity> = items
            .into_iter()
            .filter_map(|item| match Entity::from_fields(entity_type, item) {
                Ok(entity) => Some(entity),
                Err(error) => {
                    tracing::warn!("Skipping unreadable {entity_type} from server: {error}");
                    None
                }
            })
            .collect();
        Ok(self.store.cache_replace(entity_type, &entities).await?)
    }
}

/// Run a local store step, retrying once on failure.
async fn retry_local<F, Fut, R>(mutation_id: i64, mut step: F) -> SyncResult<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<R>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match step().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < LOCAL_STORE_ATTEMPTS => {
                tracing::warn!(mutation_id, attempt, "Local store step failed, retrying: {error}");
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::models::{Collection, Supplier};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Transport that replays scripted responses, echoing the request when
    /// the script is empty.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<SyncResult<Value>>>,
        requests: Mutex<Vec<MutationRequest>>,
        listings: Mutex<HashMap<EntityType, Vec<Value>>>,
    }

    impl ScriptedTransport {
        fn push(&self, response: SyncResult<Value>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn requests(&self) -> Vec<MutationRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn set_listing(&self, entity_type: EntityType, items: Vec<Value>) {
            self.listings.lock().unwrap().insert(entity_type, items);
        }

        fn echo(request: &MutationRequest) -> Value {
            let mut data = request.body.clone();
            let version = data.get("version").and_then(Value::as_i64).unwrap_or(0) + 1;
            data.insert("version".to_string(), json!(version));
            data.insert("id".to_string(), json!(request.entity_id.as_str()));
            Value::Object(data)
        }
    }

    impl LedgerTransport for ScriptedTransport {
        async fn dispatch(&self, request: &MutationRequest) -> SyncResult<Value> {
            self.requests.lock().unwrap().push(request.clone());
            let scripted = self.responses.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(Self::echo(request)))
        }

        async fn fetch_all(&self, entity_type: EntityType) -> SyncResult<Vec<Value>> {
            Ok(self
                .listings
                .lock()
                .unwrap()
                .get(&entity_type)
                .cloned()
                .unwrap_or_default())
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    fn orchestrator() -> SyncOrchestrator<ScriptedTransport> {
        let store = LedgerStore::open_in_memory().unwrap();
        // No refresh, so per-item cache writes stay observable.
        SyncOrchestrator::new(
            store,
            ScriptedTransport::default(),
            DeviceIdentity::new("device-1"),
        )
        .with_cache_types(Vec::new())
    }

    fn supplier(name: &str, version: Option<i64>) -> Entity {
        Entity::Supplier(Supplier {
            id: EntityId::new(),
            version,
            name: Some(name.to_string()),
            code: Some(format!("SUP-{name}")),
            contact_person: None,
            phone: None,
            address: None,
            is_active: Some(true),
        })
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::AlreadySyncing => panic!("expected a completed pass"),
        }
    }

    #[tokio::test]
    async fn dispatches_in_fifo_order() {
        let orchestrator = orchestrator();
        let store = orchestrator.store();
        let entities = [supplier("a", None), supplier("b", None), supplier("c", None)];
        for entity in &entities {
            store
                .enqueue(EntityType::Supplier, MutationAction::Create, entity)
                .await
                .unwrap();
        }

        let report = completed(orchestrator.sync_pending().await.unwrap());

        let sent: Vec<EntityId> = orchestrator
            .transport()
            .requests()
            .iter()
            .map(|request| request.entity_id)
            .collect();
        let expected: Vec<EntityId> = entities.iter().map(Entity::id).collect();
        assert_eq!(sent, expected);
        assert_eq!(report.synced, 3);
        assert_eq!(report.purged, 3);
        assert!(store.list_pending().await.unwrap().is_empty());

        let cached = store
            .cached_entity(EntityType::Supplier, &entities[0].id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.version(), Some(1));
    }

    #[tokio::test]
    async fn request_body_carries_version_metadata() {
        let orchestrator = orchestrator();
        let entity = supplier("a", Some(4));
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Update, &entity)
            .await
            .unwrap();

        orchestrator.sync_pending().await.unwrap();

        let body = &orchestrator.transport().requests()[0].body;
        assert_eq!(body["version"], json!(4));
        assert_eq!(body["client_id"], json!("device-1"));
        assert!(body["sync_timestamp"].is_string());
        assert_eq!(body["name"], json!("a"));
    }

    #[tokio::test]
    async fn invalid_payload_fails_without_network_call() {
        let orchestrator = orchestrator();
        let collection = Entity::Collection(Collection {
            id: EntityId::new(),
            version: None,
            supplier_id: None,
            product_id: Some(EntityId::new()),
            rate_id: None,
            quantity: Some(5.0),
            unit: Some("kg".to_string()),
            collection_date: None,
            notes: None,
        });
        orchestrator
            .store()
            .enqueue(EntityType::Collection, MutationAction::Create, &collection)
            .await
            .unwrap();

        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert_eq!(report.failed, 1);
        assert!(report
            .last_error
            .as_deref()
            .unwrap()
            .contains("Missing supplier_id"));
        assert!(orchestrator.transport().requests().is_empty());

        let pending = orchestrator.store().list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
    }

    #[tokio::test]
    async fn conflict_takes_server_state() {
        let orchestrator = orchestrator();
        let local = supplier("local", Some(1));
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Update, &local)
            .await
            .unwrap();

        let mut server = local.clone();
        if let Entity::Supplier(supplier) = &mut server {
            supplier.name = Some("server".to_string());
        }
        server.set_version(Some(2));
        orchestrator.transport().push(Err(SyncError::Conflict {
            client_version: Some(1),
            server_version: 2,
            current_data: Value::Object(server.to_fields().unwrap()),
        }));

        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.failed, 0);
        assert!(orchestrator.store().list_pending().await.unwrap().is_empty());
        assert_eq!(
            orchestrator
                .store()
                .cached_entity(EntityType::Supplier, &local.id())
                .await
                .unwrap(),
            Some(server)
        );

        let conflicts = orchestrator.store().list_conflicts(10).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].local_version, 1);
        assert_eq!(conflicts[0].server_version, 2);
        assert_eq!(conflicts[0].resolution, ResolutionAction::UseServer);
        assert_eq!(conflicts[0].local_data["name"], json!("local"));
    }

    #[tokio::test]
    async fn local_version_ahead_stays_pending() {
        let orchestrator = orchestrator();
        let local = supplier("local", Some(3));
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Update, &local)
            .await
            .unwrap();
        orchestrator.transport().push(Err(SyncError::Conflict {
            client_version: Some(3),
            server_version: 2,
            current_data: json!({ "id": local.id().as_str(), "version": 2 }),
        }));

        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert_eq!(report.failed, 1);
        assert_eq!(report.conflicts, 0);
        assert_eq!(orchestrator.store().list_pending().await.unwrap().len(), 1);
        assert!(orchestrator.store().list_conflicts(10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_back_off_then_succeed() {
        let orchestrator = orchestrator();
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Create, &supplier("a", None))
            .await
            .unwrap();
        orchestrator
            .transport()
            .push(Err(SyncError::Network("connection refused".to_string())));
        orchestrator.transport().push(Err(SyncError::Timeout));

        let started = tokio::time::Instant::now();
        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert_eq!(report.synced, 1);
        assert_eq!(orchestrator.transport().requests().len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_do_not_block_later_items() {
        let orchestrator = orchestrator();
        let first = supplier("a", None);
        let second = supplier("b", None);
        for entity in [&first, &second] {
            orchestrator
                .store()
                .enqueue(EntityType::Supplier, MutationAction::Create, entity)
                .await
                .unwrap();
        }
        for _ in 0..3 {
            orchestrator.transport().push(Err(SyncError::Timeout));
        }

        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert_eq!(report.failed, 1);
        assert_eq!(report.synced, 1);
        assert_eq!(report.last_error.as_deref(), Some("request timed out"));
        assert_eq!(orchestrator.transport().requests().len(), 4);

        let pending = orchestrator.store().list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, first.id());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_errors_are_retried_once() {
        let orchestrator = orchestrator();
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Create, &supplier("a", None))
            .await
            .unwrap();
        for _ in 0..2 {
            orchestrator.transport().push(Err(SyncError::Server {
                status: 500,
                message: "boom".to_string(),
            }));
        }

        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert_eq!(report.failed, 1);
        assert_eq!(orchestrator.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn later_mutation_uses_version_from_same_pass() {
        let orchestrator = orchestrator();
        let created = supplier("a", None);
        let mut updated = created.clone();
        if let Entity::Supplier(supplier) = &mut updated {
            supplier.phone = Some("555-0100".to_string());
        }
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Create, &created)
            .await
            .unwrap();
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Update, &updated)
            .await
            .unwrap();

        completed(orchestrator.sync_pending().await.unwrap());

        let requests = orchestrator.transport().requests();
        assert_eq!(requests[0].body["version"], Value::Null);
        assert_eq!(requests[1].body["version"], json!(1));
    }

    #[tokio::test]
    async fn follow_up_to_lost_edit_keeps_stale_version() {
        let orchestrator = orchestrator();
        let local = supplier("local", Some(1));
        let mut follow_up = local.clone();
        if let Entity::Supplier(supplier) = &mut follow_up {
            supplier.phone = Some("555-0100".to_string());
        }
        follow_up.set_version(None);
        for (action, entity) in [
            (MutationAction::Update, &local),
            (MutationAction::Update, &follow_up),
        ] {
            orchestrator
                .store()
                .enqueue(EntityType::Supplier, action, entity)
                .await
                .unwrap();
        }

        let mut server = local.clone();
        if let Entity::Supplier(supplier) = &mut server {
            supplier.name = Some("server".to_string());
        }
        server.set_version(Some(2));
        for _ in 0..2 {
            orchestrator.transport().push(Err(SyncError::Conflict {
                client_version: Some(1),
                server_version: 2,
                current_data: Value::Object(server.to_fields().unwrap()),
            }));
        }

        let report = completed(orchestrator.sync_pending().await.unwrap());

        let requests = orchestrator.transport().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].body["version"], json!(1));
        assert_eq!(report.conflicts, 2);
        assert_eq!(report.synced, 0);
        assert_eq!(
            orchestrator
                .store()
                .cached_entity(EntityType::Supplier, &local.id())
                .await
                .unwrap(),
            Some(server)
        );
    }

    #[tokio::test]
    async fn local_store_step_is_retried_once() {
        let calls = Cell::new(0);
        let result = retry_local(1, || {
            calls.set(calls.get() + 1);
            let call = calls.get();
            async move {
                if call == 1 {
                    Err(SyncError::Store(crate::Error::Database(
                        "database is locked".to_string(),
                    )))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn local_store_step_gives_up_after_second_failure() {
        let calls = Cell::new(0);
        let result: SyncResult<()> = retry_local(1, || {
            calls.set(calls.get() + 1);
            async {
                Err(SyncError::Store(crate::Error::Database(
                    "disk I/O error".to_string(),
                )))
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Store(_))));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn update_falls_back_to_cached_version() {
        let orchestrator = orchestrator();
        let cached = supplier("a", Some(7));
        orchestrator
            .store()
            .cache_write(EntityType::Supplier, std::slice::from_ref(&cached))
            .await
            .unwrap();
        let mut edited = cached.clone();
        edited.set_version(None);
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Update, &edited)
            .await
            .unwrap();

        completed(orchestrator.sync_pending().await.unwrap());

        assert_eq!(
            orchestrator.transport().requests()[0].body["version"],
            json!(7)
        );
    }

    #[tokio::test]
    async fn delete_of_missing_entity_counts_as_synced() {
        let orchestrator = orchestrator();
        let entity = supplier("a", Some(2));
        orchestrator
            .store()
            .cache_write(EntityType::Supplier, std::slice::from_ref(&entity))
            .await
            .unwrap();
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Delete, &entity)
            .await
            .unwrap();
        orchestrator
            .transport()
            .push(Err(SyncError::NotFound("supplier not found".to_string())));

        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert_eq!(report.synced, 1);
        assert_eq!(orchestrator.transport().requests().len(), 1);
        assert!(orchestrator
            .store()
            .cached_entity(EntityType::Supplier, &entity.id())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn second_pass_is_refused_while_running() {
        let orchestrator = orchestrator();
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Create, &supplier("a", None))
            .await
            .unwrap();

        let guard = orchestrator.try_start().unwrap();
        assert_eq!(orchestrator.state(), SyncState::Syncing);
        assert_eq!(
            orchestrator.sync_pending().await.unwrap(),
            SyncOutcome::AlreadySyncing
        );
        assert!(orchestrator.transport().requests().is_empty());

        drop(guard);
        assert!(!orchestrator.is_running());
        let report = completed(orchestrator.sync_pending().await.unwrap());
        assert_eq!(report.synced, 1);
        assert_eq!(orchestrator.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn refreshes_configured_caches() {
        let orchestrator = orchestrator().with_cache_types(vec![EntityType::Supplier]);
        let remote = supplier("remote", Some(3));
        orchestrator.transport().set_listing(
            EntityType::Supplier,
            vec![
                Value::Object(remote.to_fields().unwrap()),
                json!({ "not": "a supplier" }),
            ],
        );

        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert!(report.cache_refreshed);
        assert_eq!(
            orchestrator
                .store()
                .cached_entities(EntityType::Supplier)
                .await
                .unwrap(),
            vec![remote]
        );
    }

    #[tokio::test]
    async fn refresh_drops_entities_gone_from_server() {
        let orchestrator = orchestrator().with_cache_types(vec![EntityType::Supplier]);
        let stale = supplier("stale", Some(5));
        orchestrator
            .store()
            .cache_write(EntityType::Supplier, std::slice::from_ref(&stale))
            .await
            .unwrap();

        let report = completed(orchestrator.sync_pending().await.unwrap());

        assert!(report.cache_refreshed);
        assert!(orchestrator
            .store()
            .cached_entities(EntityType::Supplier)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn full_sync_reports_message() {
        let orchestrator = orchestrator();
        orchestrator
            .store()
            .enqueue(EntityType::Supplier, MutationAction::Create, &supplier("a", None))
            .await
            .unwrap();

        let result = orchestrator.full_sync().await;

        assert!(result.success);
        assert_eq!(result.message, "Synced 1, failed 0, conflicts 0");
        assert_eq!(result.report.map(|report| report.synced), Some(1));
    }
}
