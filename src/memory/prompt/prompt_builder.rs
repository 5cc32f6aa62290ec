//! Grounded prompt construction for the downstream generator.

use crate::memory::core::chunk::ScoredCandidate;
use crate::memory::core::config::PromptConfig;

const INSTRUCTIONS: &str = "You are a helpful assistant. Use ONLY the context to answer.\n\
Write 2-4 concise sentences. Include bracketed citations like [chunk_id] after facts.\n";

/// Build the answer prompt from the best-ranked candidates.
///
/// At most `config.max_chunks` candidates are used, each rendered as
/// `[chunk_id] text` with the text cut to `config.max_chars_per_chunk` characters.
#[must_use]
pub fn build_prompt(query: &str, candidates: &[ScoredCandidate], config: &PromptConfig) -> String {
    let mut context = String::new();
    for (i, candidate) in candidates.iter().take(config.max_chunks).enumerate() {
        if i > 0 {
            context.push('\n');
        }
        context.push('[');
        context.push_str(&candidate.chunk_id);
        context.push_str("] ");
        context.extend(candidate.text.chars().take(config.max_chars_per_chunk));
    }

    let mut out = String::with_capacity(INSTRUCTIONS.len() + query.len() + context.len() + 32);
    out.push_str(INSTRUCTIONS);
    out.push_str("Question: ");
    out.push_str(query);
    out.push_str("\n\nContext:\n");
    out.push_str(&context);
    out.push_str("\n\nAnswer:");
    out
}

/// Chunk ids cited by a prompt built from `candidates`, in rank order.
#[must_use]
pub fn citations(candidates: &[ScoredCandidate]) -> Vec<String> {
    candidates.iter().map(|c| c.chunk_id.clone()).collect()
}
