//! Triggers a sync pass whenever connectivity comes back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::orchestrator::{SyncOrchestrator, SyncOutcome};
use super::transport::LedgerTransport;

/// Watches online/offline observations and syncs on each offline to online edge.
pub struct ConnectivityMonitor<T> {
    orchestrator: Arc<SyncOrchestrator<T>>,
    status: watch::Receiver<bool>,
    online: bool,
}

impl<T: LedgerTransport> ConnectivityMonitor<T> {
    /// The channel's current value is the starting state; it does not trigger a pass.
    pub fn new(orchestrator: Arc<SyncOrchestrator<T>>, mut status: watch::Receiver<bool>) -> Self {
        let online = *status.borrow_and_update();
        Self {
            orchestrator,
            status,
            online,
        }
    }

    /// Process observations until every sender is dropped.
    ///
    /// Returns how many passes were triggered.
    pub async fn run(mut self) -> usize {
        let mut passes = 0;
        while self.status.changed().await.is_ok() {
            let online = *self.status.borrow_and_update();
            if self.observe(online).await {
                passes += 1;
            }
        }
        passes
    }

    /// Record one observation; runs a pass on an offline to online edge.
    pub async fn observe(&mut self, online: bool) -> bool {
        let restored = online && !self.online;
        self.online = online;
        if !restored {
            if !online {
                tracing::info!("Connectivity lost; mutations will queue locally");
            }
            return false;
        }

        tracing::info!("Connectivity restored; starting sync");
        match self.orchestrator.sync_pending().await {
            Ok(SyncOutcome::Completed(report)) => tracing::info!("{}", report.summary()),
            Ok(SyncOutcome::AlreadySyncing) => {
                tracing::debug!("Sync already running when connectivity returned");
            }
            Err(error) => tracing::warn!("Sync after reconnect failed: {error}"),
        }
        true
    }
}

/// Probe the server on an interval and publish reachability changes.
///
/// Returns once every receiver has been dropped.
pub async fn probe_connectivity<T: LedgerTransport>(
    transport: &T,
    interval: Duration,
    status: &watch::Sender<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    while !status.is_closed() {
        ticker.tick().await;
        let reachable = transport.is_reachable().await;
        status.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });
    }
}
