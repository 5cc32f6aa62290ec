//! Hybrid retrieval: candidate sources, blending, and the coordinator.

pub mod coordinator;
pub mod scoring;
pub mod sources;

pub use coordinator::{
    DEFAULT_ALPHA, RetrievalCoordinator, RetrievalMetadata, RetrievalRequest, RetrievalResult,
    sanitize_alpha,
};
pub use scoring::rank_candidates;
pub use sources::{
    BulkScanSource, CandidateSource, LocalSource, NativeVectorSource, RetrievalMethod,
    SourceFuture,
};
