//! Integration adapters for external model runtimes.

pub mod rig_adapter;

pub use rig_adapter::{generate_answer, init_tracing};
