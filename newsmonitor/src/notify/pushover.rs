use anyhow::{Context, Result};
use reqwest::Client;

use super::{Alert, Notifier};
use crate::articles::truncate_chars;

const TITLE_LIMIT: usize = 250;
const MESSAGE_LIMIT: usize = 1024;

/// Pushover message API client.
pub struct PushoverNotifier {
    client: Client,
    api_url: String,
    token: String,
    user: String,
}

impl PushoverNotifier {
    pub fn new(client: Client, api_url: impl Into<String>, token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            token: token.into(),
            user: user.into(),
        }
    }

    fn form(&self, alert: &Alert) -> Vec<(&'static str, String)> {
        let body = alert.body();
        let mut form = vec![
            ("token", self.token.clone()),
            ("user", self.user.clone()),
            ("title", truncate_chars(&alert.heading, TITLE_LIMIT).to_string()),
            ("message", truncate_chars(&body, MESSAGE_LIMIT).to_string()),
            ("priority", "0".to_string()),
            ("sound", "pushover".to_string()),
        ];
        if let Some(url) = &alert.url {
            form.push(("url", url.clone()));
            form.push(("url_title", "Read Article".to_string()));
        }
        form
    }
}

#[async_trait::async_trait]
impl Notifier for PushoverNotifier {
    fn name(&self) -> &'static str {
        "pushover"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .form(&self.form(alert))
            .send()
            .await
            .context("Pushover request failed")?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pushover error {}: {}", status, body);
        }
        Ok(())
    }
}
