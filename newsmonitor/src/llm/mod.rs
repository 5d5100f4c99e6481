use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub mod briefing;
pub mod remote;
pub mod sentiment;

/// Core trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate completion for a given prompt
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;
}

/// Request structure for LLM generation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Token usage metadata
#[derive(Debug, Clone, Default)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Build the provider selected by `llm.adapter`. `none` (or no adapter) means
/// briefings run in demo mode.
pub fn create_llm_provider(llm_config: &common::LlmConfig) -> Result<Option<Arc<dyn LlmProvider>>> {
    let adapter = llm_config.adapter.as_deref().unwrap_or("none");
    match adapter {
        "none" => Ok(None),
        "remote" => {
            let remote_config = llm_config
                .remote
                .as_ref()
                .context("Remote adapter selected but no [llm.remote] section found")?;

            let api_key_env = remote_config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
            let api_key = common::resolve_secret(api_key_env)
                .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

            let model = remote_config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
            let api_url = remote_config
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
            let timeout_secs = remote_config.timeout_seconds.unwrap_or(30);
            let max_tokens = remote_config.max_tokens.unwrap_or(500);

            info!("LLM provider initialized: remote ({}) at {}", model, api_url);
            let provider = remote::RemoteLlmProvider::new(api_url, api_key, model)
                .with_defaults(timeout_secs, max_tokens, 0.7);
            Ok(Some(Arc::new(provider)))
        }
        _ => anyhow::bail!("Unknown LLM adapter type: {}", adapter),
    }
}

/// Helper to extract JSON from text that might contain markdown backticks or preamble
pub fn extract_json_from_text(text: &str) -> Option<String> {
    // 1. Try to find content between ```json and ```
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 2. Try to find content between ``` and ```
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 3. Try to find the first '{' and last '}'
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return Some(text[start..=end].to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_and_bare_json() {
        assert_eq!(
            extract_json_from_text("Sure!\n```json\n{\"a\":1}\n```").as_deref(),
            Some("{\"a\":1}")
        );
        assert_eq!(
            extract_json_from_text("result: {\"label\":\"POSITIVE\"} done").as_deref(),
            Some("{\"label\":\"POSITIVE\"}")
        );
        assert_eq!(extract_json_from_text("no json here"), None);
        assert_eq!(extract_json_from_text("} backwards {"), None);
    }

    #[test]
    fn adapter_none_means_no_provider() {
        let cfg = common::LlmConfig::default();
        assert!(create_llm_provider(&cfg).unwrap().is_none());
    }

    #[test]
    fn unknown_adapter_or_missing_remote_section_fails() {
        let cfg = common::LlmConfig {
            adapter: Some("local".into()),
            remote: None,
        };
        assert!(create_llm_provider(&cfg).is_err());

        let cfg = common::LlmConfig {
            adapter: Some("remote".into()),
            remote: None,
        };
        assert!(create_llm_provider(&cfg).is_err());
    }
}
