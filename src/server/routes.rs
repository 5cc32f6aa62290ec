//! HTTP route handlers for the retrieval API.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::memory::adapters::rig_adapter::generate_answer;
use crate::memory::core::chunk::ScoredCandidate;
use crate::memory::core::errors::MemoryError;
use crate::memory::maintenance::rank_refresh::recompute_importance;
use crate::memory::prompt::prompt_builder::{build_prompt, citations};
use crate::memory::retrieval::coordinator::{
    RetrievalMetadata, RetrievalRequest, RetrievalResult,
};

use super::state::AppState;

type ApiError = (StatusCode, String);

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/retrieve", post(retrieve))
        .route("/api/predict", post(predict))
        .route("/api/importance/recompute", post(recompute))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "neuromem",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.coordinator.backend(),
    }))
}

/// Query request shared by retrieval and prediction.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Query text.
    #[serde(alias = "text")]
    pub query: String,
    /// Similarity weight; configured default when absent.
    pub alpha: Option<f64>,
    /// Result count; configured default when absent.
    pub k: Option<usize>,
    /// Remote pool size; configured default when absent.
    pub pool: Option<usize>,
}

impl QueryRequest {
    fn into_retrieval(self, state: &AppState) -> RetrievalRequest {
        let defaults = &state.config.retrieval;
        RetrievalRequest {
            query: self.query,
            alpha: self.alpha.unwrap_or(defaults.alpha),
            k: self.k.unwrap_or(defaults.k),
            pool: self.pool.unwrap_or(defaults.pool),
        }
    }
}

/// Grounded answer response.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    /// Generated answer.
    pub answer: String,
    /// Blend weight used.
    pub alpha: f64,
    /// Requested result count.
    pub k: usize,
    /// Chunk ids given to the generator, in rank order.
    pub citations: Vec<String>,
    /// Chunks given to the generator.
    pub chunks: Vec<ScoredCandidate>,
    /// End-to-end latency.
    pub latency_ms: u64,
    /// Retrieval diagnostics.
    pub metadata: RetrievalMetadata,
}

/// Recompute response.
#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    /// Rows written with new importance.
    pub count: usize,
}

fn internal(context: &str, err: &MemoryError) -> ApiError {
    error!(error = %err, "{context} failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{context} error: {err}"))
}

/// Rank chunks for a query.
async fn retrieve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<RetrievalResult>, ApiError> {
    let request = request.into_retrieval(&state);
    let result = state
        .coordinator
        .retrieve(&request)
        .await
        .map_err(|e| internal("Retrieval", &e))?;
    Ok(Json(result))
}

/// Retrieve, build a grounded prompt, and generate an answer.
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let start = Instant::now();
    let request = request.into_retrieval(&state);
    let result = state
        .coordinator
        .retrieve(&request)
        .await
        .map_err(|e| internal("Retrieval", &e))?;

    let prompt = build_prompt(&request.query, &result.candidates, &state.config.prompt);
    let answer = generate_answer(&state.config.llm, &prompt)
        .await
        .map_err(|e| internal("Generation", &e))?;

    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        k = request.k,
        method = %result.metadata.method,
        latency_ms,
        "Prediction served"
    );

    Ok(Json(PredictResponse {
        answer,
        alpha: result.metadata.alpha,
        k: request.k,
        citations: citations(&result.candidates),
        chunks: result.candidates,
        latency_ms,
        metadata: result.metadata,
    }))
}

/// Recompute importance for the configured store.
async fn recompute(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecomputeResponse>, ApiError> {
    let store = state.coordinator.store();
    let embedder = state.coordinator.embedder();
    let count = recompute_importance(store.as_ref(), embedder.as_ref(), &state.config.graph)
        .await
        .map_err(|e| internal("Recompute", &e))?;
    Ok(Json(RecomputeResponse { count }))
}
