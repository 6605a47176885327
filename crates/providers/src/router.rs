//! Provider selection from configuration.

use std::sync::Arc;

use ponder_config::AppConfig;
use ponder_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured model gateway.
///
/// Every supported backend speaks the OpenAI chat-completions dialect, so
/// the only per-backend difference is the base URL.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let name = config.default_provider.as_str();
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(name));

    let api_key = match (name, &config.api_key) {
        (_, Some(key)) => key.clone(),
        // Ollama doesn't need a real key
        ("ollama", None) => "ollama".into(),
        (_, None) => String::new(),
    };

    debug!(provider = name, base_url = %base_url, "Building model gateway");
    Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
