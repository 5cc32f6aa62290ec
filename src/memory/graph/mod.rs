//! Similarity graph construction and rank propagation.

pub mod propagation;
pub mod similarity_graph;

pub use propagation::{RankVector, propagate};
pub use similarity_graph::{Edge, SimilarityGraph};
