//! Startup helpers for the neuromem server.

use std::process::ExitCode;

use crate::memory::adapters::rig_adapter::init_tracing;
use crate::memory::core::config::MemoryConfig;
use crate::memory::maintenance::rank_refresh::BackgroundRankRefresh;
use crate::server::{self, AppState};

/// Run the server until Ctrl-C (used by the `neuromem-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting neuromem v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(MemoryConfig::from_env(), server::get_port())) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build state, start the optional rank refresher, and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if state creation or the server fails.
pub async fn serve(
    config: MemoryConfig,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState::new(config)
        .await
        .map_err(|e| format!("Failed to create state: {e}"))?;

    let refresher = BackgroundRankRefresh::new(
        state.coordinator.store(),
        state.coordinator.embedder(),
        state.config.graph.clone(),
        state.config.refresh.clone(),
    );
    let stop_refresh = refresher.shutdown_notifier();
    let refresh_task = refresher.spawn();

    let result = server::run_server_with_shutdown(state, port, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    })
    .await;

    stop_refresh.notify_one();
    if let Err(e) = refresh_task.await {
        tracing::warn!("Rank refresh task ended abnormally: {e}");
    }
    result
}
