//! Offline importance recompute and the background worker that triggers it.
//!
//! The recompute reads the whole collection, builds the similarity graph,
//! propagates rank and writes every chunk back with its new importance in
//! one atomic replace. The worker repeats this on an interval, but only when
//! the collection's ids or texts changed since its last run.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::memory::core::chunk::Chunk;
use crate::memory::core::config::{GraphConfig, RefreshConfig};
use crate::memory::core::errors::MemoryResult;
use crate::memory::embedding::embedder::Embedder;
use crate::memory::graph::propagation::propagate;
use crate::memory::graph::similarity_graph::SimilarityGraph;
use crate::memory::storage::chunk_store::ChunkStore;

/// Recompute importance for every chunk in `store`.
///
/// Returns the number of rows written; a missing or empty collection returns
/// `0` and writes nothing. Rows sharing a chunk id all receive that node's value.
///
/// # Errors
/// Returns an error if the store cannot be read or written, or embedding fails.
pub async fn recompute_importance(
    store: &dyn ChunkStore,
    embedder: &dyn Embedder,
    graph: &GraphConfig,
) -> MemoryResult<usize> {
    let Some(chunks) = store.read_all().await? else {
        info!("No chunk collection found, nothing to rank");
        return Ok(0);
    };
    recompute_chunks(store, embedder, graph, chunks).await
}

async fn recompute_chunks(
    store: &dyn ChunkStore,
    embedder: &dyn Embedder,
    config: &GraphConfig,
    mut chunks: Vec<Chunk>,
) -> MemoryResult<usize> {
    if chunks.is_empty() {
        info!("Chunk collection is empty, nothing to rank");
        return Ok(0);
    }

    let graph = SimilarityGraph::build(&chunks, embedder, config.sim_threshold).await?;
    let ranks = propagate(&graph, config).to_map();
    for chunk in &mut chunks {
        chunk.importance = ranks.get(&chunk.chunk_id).copied().unwrap_or(0.0);
    }

    let count = chunks.len();
    store.replace_all(chunks).await?;
    info!(
        rows = count,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Importance recomputed"
    );
    Ok(count)
}

/// Content fingerprint over chunk ids and texts, in collection order.
#[must_use]
pub fn fingerprint(chunks: &[Chunk]) -> u64 {
    let mut hasher = DefaultHasher::new();
    chunks.len().hash(&mut hasher);
    for chunk in chunks {
        chunk.chunk_id.hash(&mut hasher);
        chunk.text.hash(&mut hasher);
    }
    hasher.finish()
}

/// Statistics from a refresh run.
#[derive(Debug, Clone, Default)]
pub struct RefreshStats {
    /// Rows written with new importance.
    pub chunks_recomputed: usize,
    /// Whether the run was skipped because nothing changed.
    pub skipped: bool,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

/// Background worker keeping importance in step with the collection.
pub struct BackgroundRankRefresh {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    graph: GraphConfig,
    config: RefreshConfig,
    last_fingerprint: Mutex<Option<u64>>,
    shutdown: Arc<Notify>,
}

impl BackgroundRankRefresh {
    /// Create a new refresh worker.
    #[must_use]
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        graph: GraphConfig,
        config: RefreshConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            graph,
            config,
            last_fingerprint: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a shutdown notifier to stop the worker.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the worker as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Background rank refresh is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_seconds);
        info!(?interval, "Starting background rank refresh");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    match self.run_once().await {
                        Ok(stats) if stats.skipped => {
                            debug!("Collection unchanged, refresh skipped");
                        }
                        Ok(stats) => {
                            info!(
                                chunks = stats.chunks_recomputed,
                                duration_ms = stats.duration_ms,
                                "Rank refresh completed"
                            );
                        }
                        Err(err) => {
                            warn!(?err, "Rank refresh failed");
                        }
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Background rank refresh shutting down");
                    break;
                }
            }
        }
    }

    /// Run one refresh cycle, skipping it when the collection is unchanged.
    ///
    /// # Errors
    /// Returns an error if the recompute fails; the fingerprint is then not
    /// recorded, so the next cycle retries.
    pub async fn run_once(&self) -> MemoryResult<RefreshStats> {
        let start = Instant::now();
        let chunks = self.store.read_all().await?.unwrap_or_default();
        let current = fingerprint(&chunks);

        let mut last = self.last_fingerprint.lock().await;
        if *last == Some(current) {
            return Ok(RefreshStats {
                skipped: true,
                ..RefreshStats::default()
            });
        }

        let chunks_recomputed =
            recompute_chunks(self.store.as_ref(), self.embedder.as_ref(), &self.graph, chunks)
                .await?;
        *last = Some(current);

        Ok(RefreshStats {
            chunks_recomputed,
            skipped: false,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embedding::hashing::HashingEmbedder;
    use crate::memory::storage::jsonl_store::JsonlChunkStore;

    const EPS: f64 = 1e-9;

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::with_id("a", "d", "cats purr softly"),
            Chunk::with_id("b", "d", "cats purr loudly"),
            Chunk::with_id("c", "d", "bond yields rose"),
        ]
    }

    fn store_in(dir: &tempfile::TempDir) -> JsonlChunkStore {
        JsonlChunkStore::new(dir.path().join("chunks.jsonl"))
    }

    #[tokio::test]
    async fn test_missing_store_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let embedder = HashingEmbedder::new(64).unwrap();
        let count = recompute_importance(&store, &embedder, &GraphConfig::default())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_empty_store_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.replace_all(Vec::new()).await.unwrap();
        let embedder = HashingEmbedder::new(64).unwrap();
        let count = recompute_importance(&store, &embedder, &GraphConfig::default())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_recompute_writes_importance() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.replace_all(chunks()).await.unwrap();
        let embedder = HashingEmbedder::new(256).unwrap();

        let count = recompute_importance(&store, &embedder, &GraphConfig::default())
            .await
            .unwrap();
        assert_eq!(count, 3);

        let stored = store.read_all().await.unwrap().unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|c| (0.0..=1.0).contains(&c.importance)));
        let c = stored.iter().find(|c| c.chunk_id == "c").unwrap();
        assert!(c.importance.abs() < EPS);
        let a = stored.iter().find(|c| c.chunk_id == "a").unwrap();
        let b = stored.iter().find(|c| c.chunk_id == "b").unwrap();
        assert!(a.importance > 0.0);
        assert!((a.importance - b.importance).abs() < EPS);
    }

    #[tokio::test]
    async fn test_duplicate_ids_share_importance() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut rows = chunks();
        rows.push(Chunk::with_id("a", "d", "a later copy with other text"));
        store.replace_all(rows).await.unwrap();
        let embedder = HashingEmbedder::new(256).unwrap();

        let count = recompute_importance(&store, &embedder, &GraphConfig::default())
            .await
            .unwrap();
        assert_eq!(count, 4);

        let stored = store.read_all().await.unwrap().unwrap();
        let copies: Vec<f64> = stored
            .iter()
            .filter(|c| c.chunk_id == "a")
            .map(|c| c.importance)
            .collect();
        assert_eq!(copies.len(), 2);
        assert!((copies[0] - copies[1]).abs() < EPS);
    }

    #[test]
    fn test_fingerprint_ignores_importance() {
        let plain = chunks();
        let ranked: Vec<Chunk> = chunks().into_iter().map(|c| c.with_importance(0.7)).collect();
        assert_eq!(fingerprint(&plain), fingerprint(&ranked));

        let mut edited = chunks();
        edited[0].text.push('!');
        assert_ne!(fingerprint(&plain), fingerprint(&edited));
    }

    #[tokio::test]
    async fn test_run_once_skips_unchanged_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));
        store.replace_all(chunks()).await.unwrap();
        let worker = BackgroundRankRefresh::new(
            store.clone(),
            Arc::new(HashingEmbedder::new(64).unwrap()),
            GraphConfig::default(),
            RefreshConfig::default(),
        );

        let first = worker.run_once().await.unwrap();
        assert!(!first.skipped);
        assert_eq!(first.chunks_recomputed, 3);

        let second = worker.run_once().await.unwrap();
        assert!(second.skipped);

        let mut changed = store.read_all().await.unwrap().unwrap();
        changed.push(Chunk::with_id("d", "d", "fresh text"));
        store.replace_all(changed).await.unwrap();
        let third = worker.run_once().await.unwrap();
        assert_eq!(third.chunks_recomputed, 4);
    }

    #[tokio::test]
    async fn test_disabled_worker_exits() {
        let dir = tempfile::tempdir().unwrap();
        let worker = BackgroundRankRefresh::new(
            Arc::new(store_in(&dir)),
            Arc::new(HashingEmbedder::new(8).unwrap()),
            GraphConfig::default(),
            RefreshConfig::default(),
        );
        worker.spawn().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let dir = tempfile::tempdir().unwrap();
        let worker = BackgroundRankRefresh::new(
            Arc::new(store_in(&dir)),
            Arc::new(HashingEmbedder::new(8).unwrap()),
            GraphConfig::default(),
            RefreshConfig {
                interval_seconds: 3600,
                enabled: true,
            },
        );
        let shutdown = worker.shutdown_notifier();
        let handle = worker.spawn();
        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
