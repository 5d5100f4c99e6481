use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::json;

use super::{Alert, Notifier};

/// Payload layout, picked from the webhook host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookFormat {
    /// IFTTT Maker: `value1..value3`
    Ifttt,
    /// ntfy.sh: plain-text body, metadata in headers
    Ntfy,
    /// Anything else: a flat JSON object
    Generic,
}

impl WebhookFormat {
    pub fn detect(webhook_url: &str) -> Self {
        let host = url::Url::parse(webhook_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_default();

        if host.contains("ifttt.com") {
            WebhookFormat::Ifttt
        } else if host.contains("ntfy.sh") {
            WebhookFormat::Ntfy
        } else {
            WebhookFormat::Generic
        }
    }
}

/// Generic outbound webhook (IFTTT, ntfy, webhook.site, custom receivers).
pub struct WebhookNotifier {
    client: Client,
    url: String,
    format: WebhookFormat,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        let url = url.into().trim().to_string();
        let format = WebhookFormat::detect(&url);
        Self { client, url, format }
    }

    /// Skip host detection, e.g. for a self-hosted ntfy server.
    pub fn with_format(client: Client, url: impl Into<String>, format: WebhookFormat) -> Self {
        Self {
            client,
            url: url.into().trim().to_string(),
            format,
        }
    }

    pub fn format(&self) -> WebhookFormat {
        self.format
    }
}

fn is_accepted(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 201 | 202 | 204)
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        let url = alert.url.clone().unwrap_or_default();

        let request = match self.format {
            WebhookFormat::Ifttt => self.client.post(&self.url).json(&json!({
                "value1": format!("🤖 {}", alert.source),
                "value2": alert.body(),
                "value3": url,
            })),
            WebhookFormat::Ntfy => {
                let mut body = alert.body();
                if !url.is_empty() {
                    body.push_str(&format!("\n\nRead more: {}", url));
                }
                self.client
                    .post(&self.url)
                    .header("Title", alert.source.as_str())
                    .header("Tags", "robot,news")
                    .header("Priority", "3")
                    .header("Content-Type", "text/plain; charset=utf-8")
                    .body(body)
            }
            WebhookFormat::Generic => self.client.post(&self.url).json(&json!({
                "title": "🤖 AI News Alert",
                "message": format!("{}\n\nSource: {}\n{}", alert.title, alert.source, alert.summary),
                "url": url,
                "source": alert.source,
                "timestamp": Utc::now().to_rfc3339(),
            })),
        };

        let response = request.send().await.context("Webhook request failed")?;
        let status = response.status();
        if !is_accepted(status) {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook error {}: {}", status, body);
        }
        Ok(())
    }
}
