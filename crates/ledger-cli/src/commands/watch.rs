use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ledger_core::sync::{probe_connectivity, ConnectivityMonitor};
use tokio::sync::watch;

use crate::commands::common::{build_orchestrator, resolve_settings};
use crate::error::CliError;

/// Probe until Ctrl-C, syncing on every offline to online transition.
pub async fn run_watch(
    interval_secs: u64,
    api_url: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let settings = resolve_settings(api_url)?;
    let orchestrator = Arc::new(build_orchestrator(db_path, settings).await?);
    let interval = Duration::from_secs(interval_secs);

    // Start offline so a reachable server on the first probe triggers a pass.
    let (status_tx, status_rx) = watch::channel(false);
    let monitor = ConnectivityMonitor::new(Arc::clone(&orchestrator), status_rx);
    let monitor_task = tokio::spawn(monitor.run());

    println!(
        "Watching {} every {interval_secs}s (Ctrl-C to stop)",
        orchestrator.transport().base_url()
    );

    tokio::select! {
        () = probe_connectivity(orchestrator.transport(), interval, &status_tx) => {}
        signal = tokio::signal::ctrl_c() => signal?,
    }

    drop(status_tx);
    match monitor_task.await {
        Ok(passes) => println!("Stopped after {passes} sync pass(es)"),
        Err(error) => tracing::warn!("Connectivity monitor ended abnormally: {error}"),
    }
    Ok(())
}
