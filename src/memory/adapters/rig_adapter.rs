//! Rig adapter: answer generation with an Ollama completion model.

use reqwest::Client as ReqwestClient;
use rig::client::{CompletionClient, Nothing};
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::memory::core::config::LlmConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Initialize tracing from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Generate an answer for a prepared prompt.
///
/// # Errors
/// Returns an error if the client cannot be built or the completion fails.
pub async fn generate_answer(config: &LlmConfig, prompt: &str) -> MemoryResult<String> {
    let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
    let builder = if let Some(base_url) = &config.base_url {
        builder.base_url(base_url)
    } else {
        builder
    };
    let client = builder.build().map_err(MemoryError::from)?;
    let model = client.completion_model(config.model.clone());

    let request = model
        .completion_request(prompt.to_string())
        .temperature(config.temperature)
        .max_tokens_opt(config.max_tokens)
        .build();

    let response = model.completion(request).await?;
    let answer = extract_text(&response.choice);
    debug!(model = %config.model, chars = answer.len(), "Answer generated");
    Ok(answer.trim().to_string())
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
