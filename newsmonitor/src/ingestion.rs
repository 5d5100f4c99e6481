use anyhow::{Context, Result};
use feed_rs::model::Feed;
use feed_rs::parser;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::time::Duration;

const FEED_ACCEPT: &str = "application/rss+xml, application/xml, text/xml";

/// Fetches RSS/Atom feeds over one shared HTTP client.
#[derive(Clone)]
pub struct FeedFetcher {
    client: Client,
    max_retries: u32,
}

impl FeedFetcher {
    pub fn new(user_agent: &str, timeout: Duration, max_retries: u32) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(FEED_ACCEPT));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
        })
    }

    pub fn from_config(cfg: &common::PolitenessConfig) -> Result<Self> {
        Self::new(
            &cfg.user_agent,
            Duration::from_secs(cfg.fetch_timeout_seconds),
            cfg.max_retries,
        )
    }

    /// Fetches a feed from the given URL and parses it.
    /// Server errors, rate limiting and network failures are retried with
    /// exponential backoff; other client errors fail immediately.
    pub async fn fetch(&self, url: &str) -> Result<Feed> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                let backoff = Duration::from_secs(2u64.pow(attempt - 2)); // 1s, 2s, 4s...
                tracing::info!("Retrying feed fetch for {} (attempt {}/{}) after {:?}...", url, attempt, self.max_retries, backoff);
                tokio::time::sleep(backoff).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().await.context("failed to read response body")?;
                        let feed = parser::parse(bytes.as_ref()).context("failed to parse feed")?;
                        return Ok(feed);
                    } else if status.is_server_error() {
                        last_error = Some(anyhow::anyhow!("server error: {}", status));
                    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(anyhow::anyhow!("rate limited: {}", status));
                    } else {
                        // Other 4xx are permanent
                        return Err(anyhow::anyhow!("feed fetch failed with status: {}", status));
                    }
                }
                Err(e) => {
                    last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
<item><title>One</title><link>https://example.com/1</link><description>d</description></item>
</channel></rss>"#;

    #[tokio::test]
    async fn parses_feed_and_sends_accept_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed")
            .match_header("accept", FEED_ACCEPT)
            .match_header("user-agent", "test-agent")
            .with_status(200)
            .with_body(RSS)
            .create_async()
            .await;

        let fetcher = FeedFetcher::new("test-agent", Duration::from_secs(5), 1).expect("fetcher");
        let feed = fetcher.fetch(&format!("{}/feed", server.url())).await.expect("feed");
        assert_eq!(feed.entries.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gone")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let fetcher = FeedFetcher::new("test-agent", Duration::from_secs(5), 3).expect("fetcher");
        let err = fetcher.fetch(&format!("{}/gone", server.url())).await.unwrap_err();
        assert!(err.to_string().contains("404"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_retried_then_reported() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let fetcher = FeedFetcher::new("test-agent", Duration::from_secs(5), 2).expect("fetcher");
        let err = fetcher.fetch(&format!("{}/flaky", server.url())).await.unwrap_err();
        assert!(err.to_string().contains("server error"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn garbage_body_fails_to_parse() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/html")
            .with_status(200)
            .with_body("<html><body>not a feed</body></html>")
            .create_async()
            .await;

        let fetcher = FeedFetcher::new("test-agent", Duration::from_secs(5), 1).expect("fetcher");
        let err = fetcher.fetch(&format!("{}/html", server.url())).await.unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
