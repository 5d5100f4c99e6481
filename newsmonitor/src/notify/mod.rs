//! Outbound notification channels.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::articles::Article;

pub mod pushover;
pub mod webhook;

pub use pushover::PushoverNotifier;
pub use webhook::{WebhookFormat, WebhookNotifier};

/// What gets pushed to a channel. Each channel lays these fields out its own way.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Short heading, used as the push title
    pub heading: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub url: Option<String>,
}

impl Alert {
    pub fn for_article(article: &Article) -> Self {
        Self {
            heading: format!("AI News: {}", article.source),
            title: article.title.clone(),
            summary: article.summary.clone(),
            source: article.source.clone(),
            url: Some(article.url.clone()),
        }
    }

    /// The canned alert sent by the "test notification" action.
    pub fn test() -> Self {
        Self {
            heading: "AI News Test".to_string(),
            title: "AI News Monitor Test - System Working!".to_string(),
            summary: "This is a test notification from your AI News Monitor system. \
                      If you received this, your notifications are working correctly!"
                .to_string(),
            source: "AI News Monitor".to_string(),
            url: Some("https://github.com".to_string()),
        }
    }

    /// Title and summary separated by a blank line.
    pub fn body(&self) -> String {
        format!("{}\n\n{}", self.title, self.summary)
    }
}

/// A delivery channel (Pushover, webhook, ...).
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Result of pushing one alert to every channel.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

impl DispatchOutcome {
    pub fn any_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Fans an alert out to all configured channels.
#[derive(Clone, Default)]
pub struct NotificationHub {
    channels: Vec<Arc<dyn Notifier>>,
}

impl NotificationHub {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Build the channels whose credentials resolve from the environment.
    pub fn from_config(cfg: &common::NotificationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .context("failed to build notification http client")?;

        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();

        let token = common::resolve_secret(&cfg.pushover_token_env);
        let user = common::resolve_secret(&cfg.pushover_user_env);
        match (token, user) {
            (Some(token), Some(user)) => {
                channels.push(Arc::new(PushoverNotifier::new(
                    client.clone(),
                    &cfg.pushover_api_url,
                    token,
                    user,
                )));
            }
            (None, None) => info!("Pushover not configured"),
            _ => warn!(
                "Pushover needs both {} and {}; channel disabled",
                cfg.pushover_token_env, cfg.pushover_user_env
            ),
        }

        match common::resolve_secret(&cfg.webhook_url_env) {
            Some(url) => channels.push(Arc::new(WebhookNotifier::new(client, url))),
            None => info!("Webhook not configured"),
        }

        Ok(Self::new(channels))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Try every channel; a failure on one never prevents the others.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for channel in &self.channels {
            match channel.notify(alert).await {
                Ok(()) => {
                    info!("{} notification sent: {}", channel.name(), alert.title);
                    outcome.delivered.push(channel.name());
                }
                Err(e) => {
                    warn!("{} notification failed: {:#}", channel.name(), e);
                    outcome.failed.push((channel.name(), format!("{:#}", e)));
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        ok: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn notify(&self, _alert: &Alert) -> Result<()> {
            if self.ok {
                Ok(())
            } else {
                anyhow::bail!("boom")
            }
        }
    }

    #[tokio::test]
    async fn dispatch_tries_every_channel() {
        let hub = NotificationHub::new(vec![
            Arc::new(Fixed { name: "bad", ok: false }),
            Arc::new(Fixed { name: "good", ok: true }),
        ]);

        let outcome = hub.dispatch(&Alert::test()).await;
        assert!(outcome.any_delivered());
        assert_eq!(outcome.delivered, vec!["good"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "bad");
    }

    #[tokio::test]
    async fn empty_hub_delivers_nothing() {
        let hub = NotificationHub::default();
        assert!(hub.is_empty());
        assert!(!hub.dispatch(&Alert::test()).await.any_delivered());
    }

    #[test]
    fn article_alert_layout() {
        let article = Article {
            title: "T".into(),
            url: "https://x/y".into(),
            source: "Src".into(),
            published: None,
            summary: "S".into(),
            hash: "h".into(),
        };
        let alert = Alert::for_article(&article);
        assert_eq!(alert.heading, "AI News: Src");
        assert_eq!(alert.body(), "T\n\nS");
        assert_eq!(alert.url.as_deref(), Some("https://x/y"));
    }
}
