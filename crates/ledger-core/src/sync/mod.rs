//! Offline mutation replay: retry policy, conflict resolution, transport, and
//! the orchestrator that ties them together.

mod connectivity;
mod error;
mod http;
mod orchestrator;
mod resolver;
mod retry;
mod transport;

pub use connectivity::{probe_connectivity, ConnectivityMonitor};
pub use error::{ErrorClass, SyncError, SyncResult};
pub use http::{interpret_response, HttpTransport};
pub use orchestrator::{
    FullSyncResult, SyncOrchestrator, SyncOutcome, SyncPassGuard, SyncReport,
    DEFAULT_CACHE_TYPES,
};
pub use resolver::{resolve, Resolution};
pub use retry::RetryPolicy;
pub use transport::{LedgerTransport, MutationRequest};
