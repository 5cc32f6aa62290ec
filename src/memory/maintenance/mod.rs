//! Importance recompute and its background refresh worker.

pub mod rank_refresh;

pub use rank_refresh::{BackgroundRankRefresh, RefreshStats, fingerprint, recompute_importance};
