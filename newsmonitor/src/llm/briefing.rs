// Briefing module
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::sentiment::{analyze_sentiment, Sentiment, SentimentLabel};
use super::{LlmProvider, LlmRequest};
use crate::articles::Article;

/// Headlines handed to the model per briefing
const MAX_HEADLINES: usize = 10;

const BRIEFING_TEMPLATE: &str = "Provide a concise AI market briefing in exactly this format for mobile reading:

🎯 TOP AI DEVELOPMENT:
[Three key developments in AI this week, each in 1-2 sentences]

MOST IMPORTANT AI REGULATORY NEWS:
[One key regulatory update or framework change, with a link if available]

💼 BUSINESS IMPACT:
[2-3 sentences on business implications]

📈 INVESTMENT ANGLE:
[Key investment opportunity or risk]

⚡ ACTION ITEM:
[One specific action to take]

Keep it under 200 words total. Be conversational and actionable.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BriefingStatus {
    Success,
    Demo,
}

#[derive(Debug, Clone, Serialize)]
pub struct Briefing {
    pub briefing: String,
    pub voice_text: String,
    pub sentiment: Sentiment,
    pub method: String,
    pub status: BriefingStatus,
    pub generated_at: DateTime<Utc>,
}

/// Rewrite briefing text so a speech synthesizer reads it naturally.
pub fn prepare_voice_text(text: &str) -> String {
    text.replace('🎯', "Top AI Development: ")
        .replace('💼', "Business Impact: ")
        .replace('📈', "Investment Angle: ")
        .replace('⚡', "Action Item: ")
        .replace('•', ". ")
        .replace("\n\n", ". ")
        .replace('\n', " ")
}

/// Prompt sent to the model: recent headlines followed by the briefing layout.
pub fn build_prompt(articles: &[Article]) -> String {
    let mut prompt = String::new();
    if !articles.is_empty() {
        prompt.push_str("Base the briefing on these recent AI headlines:\n");
        for article in articles.iter().take(MAX_HEADLINES) {
            prompt.push_str(&format!("- {} ({})\n", article.title, article.source));
        }
        prompt.push('\n');
    }
    prompt.push_str(BRIEFING_TEMPLATE);
    prompt
}

/// Canned briefing used when no model is configured or the model fails.
pub fn demo_briefing(now: DateTime<Utc>) -> Briefing {
    let local = now.with_timezone(&Local);
    let briefing = format!(
        "🎯 TOP AI DEVELOPMENT:
Enterprise AI adoption hits 78% among Fortune 500 companies this quarter, with deployment time reducing by 65%.

💼 BUSINESS IMPACT:
Companies using AI strategically are seeing 25% faster decision-making and 40% improvement in operational efficiency. The competitive gap is widening quickly.

📈 INVESTMENT ANGLE:
AI infrastructure stocks up 32% this quarter. Best opportunities in specialized AI tools and data management platforms.

⚡ ACTION ITEM:
Assess your organization's AI readiness this week.

Generated at {} • Demo Mode",
        local.format("%I:%M %p")
    );

    Briefing {
        voice_text: prepare_voice_text(&briefing),
        briefing,
        sentiment: Sentiment {
            label: SentimentLabel::Positive,
            score: 0.78,
        },
        method: "Demo".to_string(),
        status: BriefingStatus::Demo,
        generated_at: now,
    }
}

pub struct BriefingService {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl BriefingService {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_demo(&self) -> bool {
        self.provider.is_none()
    }

    /// Executive briefing for the given headlines (newest first).
    pub async fn generate(&self, articles: &[Article]) -> Briefing {
        let now = Utc::now();
        let Some(provider) = &self.provider else {
            return demo_briefing(now);
        };

        let request = LlmRequest {
            prompt: build_prompt(articles),
            max_tokens: None,
            temperature: Some(0.7),
            timeout_seconds: None,
        };

        let response = match provider.generate(request).await {
            Ok(r) if !r.content.trim().is_empty() => r,
            Ok(_) => {
                warn!("LLM briefing came back empty, using demo briefing");
                return demo_briefing(now);
            }
            Err(e) => {
                warn!("LLM briefing failed: {:#}, using demo briefing", e);
                return demo_briefing(now);
            }
        };

        let content = response.content.trim().to_string();
        let sentiment = analyze_sentiment(provider.as_ref(), &content).await;
        info!(
            "Briefing generated by {} ({} tokens)",
            response.model, response.usage.total_tokens
        );

        Briefing {
            voice_text: prepare_voice_text(&content),
            briefing: content,
            sentiment,
            method: format!("LLM ({})", response.model),
            status: BriefingStatus::Success,
            generated_at: now,
        }
    }
}
