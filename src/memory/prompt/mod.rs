//! Prompt construction for the answer generator.

pub mod prompt_builder;

pub use prompt_builder::{build_prompt, citations};
