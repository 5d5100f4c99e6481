// Sentiment module
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{LlmProvider, LlmRequest};

/// Longest input sent for classification, in characters
const MAX_INPUT_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f32,
}

impl Sentiment {
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.5,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentimentJson {
    label: String,
    score: f32,
}

fn parse_sentiment(raw: &str) -> Result<Sentiment> {
    let cleaned = super::extract_json_from_text(raw).context("No valid JSON found in sentiment response")?;
    let data: SentimentJson = serde_json::from_str(&cleaned)
        .with_context(|| format!("Failed to parse sentiment JSON. Input was: {}", cleaned))?;

    let label = match data.label.trim().to_ascii_uppercase().as_str() {
        "POSITIVE" => SentimentLabel::Positive,
        "NEGATIVE" => SentimentLabel::Negative,
        "NEUTRAL" => SentimentLabel::Neutral,
        other => anyhow::bail!("Unknown sentiment label: {}", other),
    };

    Ok(Sentiment {
        label,
        score: data.score.clamp(0.0, 1.0),
    })
}

/// Classify `text` with the model. Any failure yields `NEUTRAL 0.5`.
pub async fn analyze_sentiment<P: LlmProvider + ?Sized>(provider: &P, text: &str) -> Sentiment {
    let input: String = text.chars().take(MAX_INPUT_CHARS).collect();
    let prompt = format!(
        r#"Classify the overall sentiment of the text below.

OUTPUT FORMAT (strict JSON):
{{"label": "POSITIVE" | "NEGATIVE" | "NEUTRAL", "score": confidence between 0 and 1}}

TEXT:
{}
"#,
        input
    );

    let request = LlmRequest {
        prompt,
        max_tokens: Some(50),
        temperature: Some(0.0),
        timeout_seconds: None,
    };

    let result = match provider.generate(request).await {
        Ok(response) => parse_sentiment(&response.content),
        Err(e) => Err(e),
    };

    match result {
        Ok(sentiment) => {
            info!("Sentiment: {:?} ({:.2})", sentiment.label, sentiment.score);
            sentiment
        }
        Err(e) => {
            warn!("Sentiment analysis failed: {:#}, defaulting to neutral", e);
            Sentiment::neutral()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, UsageMetadata};
    use std::sync::Mutex;

    struct CannedProvider {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedProvider {
        fn new(reply: Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for CannedProvider {
        async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.prompts.lock().unwrap().push(request.prompt);
            match &self.reply {
                Ok(content) => Ok(LlmResponse {
                    content: content.clone(),
                    usage: UsageMetadata::default(),
                    model: "canned".into(),
                }),
                Err(e) => Err(anyhow::anyhow!(e.clone())),
            }
        }
    }

    #[tokio::test]
    async fn parses_fenced_reply() {
        let provider = CannedProvider::new(Ok("```json\n{\"label\": \"positive\", \"score\": 0.91}\n```"));
        let s = analyze_sentiment(&provider, "Great quarter for AI startups").await;
        assert_eq!(s.label, SentimentLabel::Positive);
        assert!((s.score - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn failures_fall_back_to_neutral() {
        let provider = CannedProvider::new(Err("boom"));
        assert_eq!(analyze_sentiment(&provider, "x").await, Sentiment::neutral());

        let provider = CannedProvider::new(Ok("I think it's fine"));
        assert_eq!(analyze_sentiment(&provider, "x").await, Sentiment::neutral());

        let provider = CannedProvider::new(Ok("{\"label\": \"MIXED\", \"score\": 0.4}"));
        assert_eq!(analyze_sentiment(&provider, "x").await, Sentiment::neutral());
    }

    #[tokio::test]
    async fn input_is_truncated() {
        let provider = CannedProvider::new(Ok("{\"label\": \"NEUTRAL\", \"score\": 2.0}"));
        let long = "é".repeat(2000);
        let s = analyze_sentiment(&provider, &long).await;
        assert_eq!(s.score, 1.0);

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains(&"é".repeat(512)));
        assert!(!prompts[0].contains(&"é".repeat(513)));
    }

    #[test]
    fn label_serializes_uppercase() {
        let json = serde_json::to_string(&Sentiment::neutral()).unwrap();
        assert_eq!(json, r#"{"label":"NEUTRAL","score":0.5}"#);
    }
}
