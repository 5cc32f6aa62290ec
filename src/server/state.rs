//! Application state shared across all request handlers.

use std::sync::Arc;

use tracing::info;

use crate::memory::core::config::MemoryConfig;
use crate::memory::core::errors::MemoryResult;
use crate::memory::embedding::embedder::build_embedder;
use crate::memory::retrieval::coordinator::RetrievalCoordinator;

/// Shared application state.
pub struct AppState {
    /// Effective configuration.
    pub config: MemoryConfig,
    /// Retrieval coordinator for the configured backend.
    pub coordinator: RetrievalCoordinator,
}

impl AppState {
    /// Validate `config`, build the embedder and the configured backend.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the embedder cannot
    /// be constructed, or the remote store cannot be opened.
    pub async fn new(config: MemoryConfig) -> MemoryResult<Arc<Self>> {
        config.validate()?;
        let embedder = build_embedder(&config.embedding)?;
        let coordinator = RetrievalCoordinator::from_config(&config, embedder).await?;
        info!(backend = ?coordinator.backend(), "Application state ready");
        Ok(Self::from_parts(config, coordinator))
    }

    /// Assemble state from an already built coordinator.
    #[must_use]
    pub fn from_parts(config: MemoryConfig, coordinator: RetrievalCoordinator) -> Arc<Self> {
        Arc::new(Self {
            config,
            coordinator,
        })
    }
}
