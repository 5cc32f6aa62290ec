//! Retrieval coordinator: embeds the query, walks the candidate sources in
//! order until one answers, then blends and truncates.
//!
//! Store trouble never surfaces as an error. A stage that fails or times out
//! is recorded in [`RetrievalMetadata::degraded`] and the next stage is tried;
//! when none answers the result is empty with method `unavailable`. Only a
//! failing embedding service is returned as an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::memory::core::chunk::{Candidate, ScoredCandidate};
use crate::memory::core::config::{BackendKind, MemoryConfig, RetrievalConfig};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::embedding::embedder::Embedder;
use crate::memory::retrieval::scoring::rank_candidates;
use crate::memory::retrieval::sources::{
    BulkScanSource, CandidateSource, LocalSource, NativeVectorSource, RetrievalMethod,
};
use crate::memory::storage::chunk_store::ChunkStore;
use crate::memory::storage::jsonl_store::JsonlChunkStore;
use crate::memory::storage::sqlite_store::SqliteChunkStore;
use crate::memory::storage::sqlite_vec_loader::init_sqlite_vec_extension;

/// Blend weight used when the caller supplies a non-number.
pub const DEFAULT_ALPHA: f64 = 0.5;

/// A retrieval query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Query text.
    pub query: String,
    /// Similarity weight in `[0, 1]`.
    pub alpha: f64,
    /// Number of results to return.
    pub k: usize,
    /// Candidates requested from a remote store before blending.
    pub pool: usize,
}

impl RetrievalRequest {
    /// Request with the built-in defaults.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self::with_defaults(query, &RetrievalConfig::default())
    }

    /// Request with defaults taken from `config`.
    #[must_use]
    pub fn with_defaults(query: impl Into<String>, config: &RetrievalConfig) -> Self {
        Self {
            query: query.into(),
            alpha: config.alpha,
            k: config.k,
            pool: config.pool,
        }
    }

    /// Set the blend weight.
    #[must_use]
    pub const fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the result count.
    #[must_use]
    pub const fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set the remote pool size.
    #[must_use]
    pub const fn pool(mut self, pool: usize) -> Self {
        self.pool = pool;
        self
    }
}

/// Diagnostics returned with every retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    /// Blend weight actually used.
    pub alpha: f64,
    /// Requested result count.
    pub k: usize,
    /// Requested pool size; `0` for the local strategy.
    pub pool: usize,
    /// Candidates blended before truncation.
    pub pool_size: usize,
    /// Stage that produced the candidates.
    pub method: RetrievalMethod,
    /// Stages that failed before `method` answered.
    pub degraded: Vec<RetrievalMethod>,
    /// Wall time of the call.
    pub elapsed_ms: u64,
}

/// Ranked candidates plus metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Candidates, best first, at most `k`.
    pub candidates: Vec<ScoredCandidate>,
    /// Diagnostics.
    pub metadata: RetrievalMetadata,
}

/// Orchestrates one retrieval strategy over an ordered list of sources.
pub struct RetrievalCoordinator {
    backend: BackendKind,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    sources: Vec<Arc<dyn CandidateSource>>,
    stage_timeout: Option<Duration>,
}

impl RetrievalCoordinator {
    /// Build a coordinator from explicit parts.
    ///
    /// `store` is the collection the sources read, exposed for importance recompute.
    #[must_use]
    pub fn new(
        backend: BackendKind,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        sources: Vec<Arc<dyn CandidateSource>>,
        stage_timeout: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            embedder,
            store,
            sources,
            stage_timeout,
        }
    }

    /// In-process strategy over a locally held collection.
    #[must_use]
    pub fn local(store: Arc<dyn ChunkStore>, embedder: Arc<dyn Embedder>) -> Self {
        let source: Arc<dyn CandidateSource> =
            Arc::new(LocalSource::new(Arc::clone(&store), Arc::clone(&embedder)));
        Self::new(BackendKind::Local, embedder, store, vec![source], None)
    }

    /// Remote strategy: native similarity query first, bulk scan second.
    ///
    /// `scan_store` should hold its own connection to the same database. A
    /// timed-out native query keeps running on its connection thread, and a
    /// scan queued behind it would time out as well.
    #[must_use]
    pub fn remote(
        store: Arc<SqliteChunkStore>,
        scan_store: Arc<SqliteChunkStore>,
        embedder: Arc<dyn Embedder>,
        stage_timeout: Duration,
    ) -> Self {
        let sources: Vec<Arc<dyn CandidateSource>> = vec![
            Arc::new(NativeVectorSource::new(Arc::clone(&store))),
            Arc::new(BulkScanSource::new(scan_store)),
        ];
        Self::new(
            BackendKind::Remote,
            embedder,
            store,
            sources,
            Some(stage_timeout),
        )
    }

    /// Build the strategy selected by `config.backend`.
    ///
    /// # Errors
    /// Returns an error if the remote database cannot be opened.
    pub async fn from_config(
        config: &MemoryConfig,
        embedder: Arc<dyn Embedder>,
    ) -> MemoryResult<Self> {
        match config.backend {
            BackendKind::Local => {
                let store = Arc::new(JsonlChunkStore::new(
                    config.storage.local_chunks_path.clone(),
                ));
                info!(path = %store.path().display(), "Using local retrieval backend");
                Ok(Self::local(store, embedder))
            }
            BackendKind::Remote => {
                init_sqlite_vec_extension();
                let store = Arc::new(SqliteChunkStore::new(&config.storage).await?);
                let scan_store = Arc::new(SqliteChunkStore::new(&config.storage).await?);
                info!(
                    path = %config.storage.sqlite_path.display(),
                    table = %config.storage.chunk_table,
                    "Using remote retrieval backend"
                );
                Ok(Self::remote(
                    store,
                    scan_store,
                    embedder,
                    config.retrieval.remote_timeout(),
                ))
            }
        }
    }

    /// Selected strategy.
    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Collection read by the sources.
    #[must_use]
    pub fn store(&self) -> Arc<dyn ChunkStore> {
        Arc::clone(&self.store)
    }

    /// Embedding service used for queries.
    #[must_use]
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Run one retrieval.
    ///
    /// # Errors
    /// Returns an error only when the query cannot be embedded.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> MemoryResult<RetrievalResult> {
        let start = Instant::now();
        let alpha = sanitize_alpha(request.alpha);
        let pool = match self.backend {
            BackendKind::Local => 0,
            BackendKind::Remote => request.pool,
        };

        let query = self.embedder.embed_text(&request.query).await?;

        let mut degraded = Vec::new();
        let mut answered = None;
        let last = self.sources.len().saturating_sub(1);
        for (stage, source) in self.sources.iter().enumerate() {
            let method = source.method();
            match self.run_stage(source.as_ref(), &query.vec, request.pool).await {
                Ok(candidates) => {
                    debug!(%method, candidates = candidates.len(), "Retrieval stage answered");
                    answered = Some((method, candidates));
                    break;
                }
                Err(err) if err.is_dependency_failure() => return Err(err),
                Err(err) => {
                    if stage == last {
                        error!(%method, error = %err, "Last retrieval stage failed");
                    } else {
                        warn!(%method, error = %err, "Retrieval stage failed, falling back");
                    }
                    degraded.push(method);
                }
            }
        }

        let (method, candidates) =
            answered.unwrap_or((RetrievalMethod::Unavailable, Vec::new()));
        let pool_size = candidates.len();
        let candidates = rank_candidates(candidates, alpha, request.k);

        Ok(RetrievalResult {
            candidates,
            metadata: RetrievalMetadata {
                alpha,
                k: request.k,
                pool,
                pool_size,
                method,
                degraded,
                elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
        })
    }

    async fn run_stage(
        &self,
        source: &dyn CandidateSource,
        query: &[f64],
        pool: usize,
    ) -> MemoryResult<Vec<Candidate>> {
        match self.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, source.fetch(query, pool))
                .await
                .map_err(|_| MemoryError::Timeout(limit))?,
            None => source.fetch(query, pool).await,
        }
    }
}

/// Clamp `alpha` into `[0, 1]`; a NaN falls back to [`DEFAULT_ALPHA`].
#[must_use]
pub fn sanitize_alpha(alpha: f64) -> f64 {
    if alpha.is_nan() {
        warn!(default = DEFAULT_ALPHA, "alpha is not a number, using default");
        return DEFAULT_ALPHA;
    }
    let clamped = alpha.clamp(0.0, 1.0);
    if (clamped - alpha).abs() > 0.0 {
        warn!(requested = alpha, used = clamped, "alpha out of range, clamped");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::memory::core::chunk::Chunk;
    use crate::memory::core::config::StorageConfig;
    use crate::memory::embedding::hashing::HashingEmbedder;
    use crate::memory::retrieval::sources::SourceFuture;

    const EPS: f64 = 1e-9;

    struct FixedSource {
        method: RetrievalMethod,
        outcome: Option<Vec<Candidate>>,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn ok(method: RetrievalMethod, candidates: Vec<Candidate>) -> Arc<Self> {
            Arc::new(Self {
                method,
                outcome: Some(candidates),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(method: RetrievalMethod) -> Arc<Self> {
            Arc::new(Self {
                method,
                outcome: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl CandidateSource for FixedSource {
        fn method(&self) -> RetrievalMethod {
            self.method
        }

        fn fetch<'a>(
            &'a self,
            _query: &'a [f64],
            _pool: usize,
        ) -> SourceFuture<'a, MemoryResult<Vec<Candidate>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self.outcome.clone();
            Box::pin(async move { outcome.ok_or(MemoryError::VectorCapabilityUnsupported) })
        }
    }

    struct SlowSource;

    impl CandidateSource for SlowSource {
        fn method(&self) -> RetrievalMethod {
            RetrievalMethod::NativeVectorQuery
        }

        fn fetch<'a>(
            &'a self,
            _query: &'a [f64],
            _pool: usize,
        ) -> SourceFuture<'a, MemoryResult<Vec<Candidate>>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Vec::new())
            })
        }
    }

    fn candidate(id: &str, importance: f64, similarity: f64) -> Candidate {
        Candidate {
            chunk_id: id.to_string(),
            text: format!("text of {id}"),
            importance,
            similarity,
        }
    }

    fn empty_store(dir: &tempfile::TempDir) -> Arc<JsonlChunkStore> {
        Arc::new(JsonlChunkStore::new(dir.path().join("chunks.jsonl")))
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(32).unwrap())
    }

    fn remote_with(
        dir: &tempfile::TempDir,
        sources: Vec<Arc<dyn CandidateSource>>,
        timeout: Duration,
    ) -> RetrievalCoordinator {
        RetrievalCoordinator::new(
            BackendKind::Remote,
            embedder(),
            empty_store(dir),
            sources,
            Some(timeout),
        )
    }

    #[test]
    fn test_sanitize_alpha() {
        assert!((sanitize_alpha(0.3) - 0.3).abs() < EPS);
        assert!((sanitize_alpha(1.7) - 1.0).abs() < EPS);
        assert!(sanitize_alpha(-2.0).abs() < EPS);
        assert!((sanitize_alpha(f64::NAN) - DEFAULT_ALPHA).abs() < EPS);
    }

    #[test]
    fn test_request_builders() {
        let request = RetrievalRequest::new("q").alpha(0.9).k(2).pool(10);
        assert_eq!(request.k, 2);
        assert_eq!(request.pool, 10);
        assert!((request.alpha - 0.9).abs() < EPS);
    }

    #[tokio::test]
    async fn test_native_success_skips_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let native = FixedSource::ok(
            RetrievalMethod::NativeVectorQuery,
            vec![candidate("a", 0.0, 0.9), candidate("b", 1.0, 0.1)],
        );
        let bulk = FixedSource::ok(RetrievalMethod::ClientSideFallback, Vec::new());
        let coordinator = remote_with(
            &dir,
            vec![native.clone(), bulk.clone()],
            Duration::from_secs(1),
        );

        let result = coordinator
            .retrieve(&RetrievalRequest::new("q").alpha(0.0).k(5).pool(7))
            .await
            .unwrap();
        assert_eq!(result.metadata.method, RetrievalMethod::NativeVectorQuery);
        assert!(result.metadata.degraded.is_empty());
        assert_eq!(result.metadata.pool, 7);
        assert_eq!(result.metadata.pool_size, 2);
        // Blend still applies: alpha 0 puts the important chunk first.
        assert_eq!(result.candidates[0].chunk_id, "b");
        assert_eq!(bulk.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_native_failure_falls_back_to_bulk_scan() {
        let dir = tempfile::tempdir().unwrap();
        let native = FixedSource::failing(RetrievalMethod::NativeVectorQuery);
        let bulk = FixedSource::ok(
            RetrievalMethod::ClientSideFallback,
            vec![candidate("x", 0.2, 0.8)],
        );
        let coordinator = remote_with(
            &dir,
            vec![native.clone(), bulk.clone()],
            Duration::from_secs(1),
        );

        let result = coordinator.retrieve(&RetrievalRequest::new("q")).await.unwrap();
        assert_eq!(result.metadata.method, RetrievalMethod::ClientSideFallback);
        assert_eq!(result.metadata.degraded, vec![RetrievalMethod::NativeVectorQuery]);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(native.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bulk.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_stages_failing_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = remote_with(
            &dir,
            vec![
                FixedSource::failing(RetrievalMethod::NativeVectorQuery),
                FixedSource::failing(RetrievalMethod::ClientSideFallback),
            ],
            Duration::from_secs(1),
        );

        let result = coordinator.retrieve(&RetrievalRequest::new("q")).await.unwrap();
        assert!(result.candidates.is_empty());
        assert_eq!(result.metadata.method, RetrievalMethod::Unavailable);
        assert_eq!(result.metadata.pool_size, 0);
        assert_eq!(result.metadata.degraded.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_stage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bulk = FixedSource::ok(
            RetrievalMethod::ClientSideFallback,
            vec![candidate("late", 0.0, 0.5)],
        );
        let coordinator = remote_with(
            &dir,
            vec![Arc::new(SlowSource), bulk],
            Duration::from_millis(20),
        );

        let result = coordinator.retrieve(&RetrievalRequest::new("q")).await.unwrap();
        assert_eq!(result.metadata.method, RetrievalMethod::ClientSideFallback);
        assert_eq!(result.metadata.degraded, vec![RetrievalMethod::NativeVectorQuery]);
    }

    #[tokio::test]
    async fn test_local_empty_file_returns_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir);
        store.replace_all(Vec::new()).await.unwrap();
        let coordinator = RetrievalCoordinator::local(store, embedder());

        let result = coordinator
            .retrieve(&RetrievalRequest::new("anything"))
            .await
            .unwrap();
        assert!(result.candidates.is_empty());
        assert_eq!(result.metadata.method, RetrievalMethod::Local);
        assert_eq!(result.metadata.pool, 0);
        assert_eq!(result.metadata.pool_size, 0);
    }

    #[tokio::test]
    async fn test_local_missing_file_serves_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RetrievalCoordinator::local(empty_store(&dir), embedder());

        let result = coordinator
            .retrieve(&RetrievalRequest::new("local mode").pool(50))
            .await
            .unwrap();
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].chunk_id, Chunk::placeholder().chunk_id);
        assert_eq!(result.metadata.pool, 0);
    }

    #[tokio::test]
    async fn test_k_zero_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RetrievalCoordinator::local(empty_store(&dir), embedder());
        let result = coordinator
            .retrieve(&RetrievalRequest::new("q").k(0))
            .await
            .unwrap();
        assert!(result.candidates.is_empty());
        assert_eq!(result.metadata.pool_size, 1);
    }

    #[tokio::test]
    async fn test_alpha_is_clamped_in_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = RetrievalCoordinator::local(empty_store(&dir), embedder());
        let result = coordinator
            .retrieve(&RetrievalRequest::new("q").alpha(3.0))
            .await
            .unwrap();
        assert!((result.metadata.alpha - 1.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_scan_answers_while_vector_connection_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            sqlite_path: dir.path().join("remote.sqlite"),
            ..StorageConfig::default()
        };
        let store = Arc::new(SqliteChunkStore::new(&config).await.unwrap());
        let scan_store = Arc::new(SqliteChunkStore::new(&config).await.unwrap());
        store
            .upsert_chunks(vec![(Chunk::with_id("a", "d", "cats purr"), vec![1.0, 0.0])])
            .await
            .unwrap();

        let busy = Arc::clone(&store);
        let holder = tokio::spawn(async move { busy.occupy(Duration::from_millis(600)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let coordinator =
            RetrievalCoordinator::remote(store, scan_store, embedder(), Duration::from_millis(200));
        let result = coordinator.retrieve(&RetrievalRequest::new("q")).await.unwrap();
        assert_eq!(result.metadata.method, RetrievalMethod::ClientSideFallback);
        assert_eq!(result.metadata.degraded, vec![RetrievalMethod::NativeVectorQuery]);
        assert_eq!(result.candidates.len(), 1);
        holder.await.unwrap();
    }
}
