use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::{Config, SourceConfig};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::articles::{dedup_and_sort, extract_articles, Article, ArticleView, ExtractLimits, KeywordFilter};
use crate::ingestion::FeedFetcher;
use crate::notify::{Alert, NotificationHub};
use crate::storage;

/// Pacing and caps for one monitor.
#[derive(Debug, Clone, Copy)]
pub struct MonitorLimits {
    pub extract: ExtractLimits,
    pub max_notifications_per_run: usize,
    pub recent_limit: usize,
    pub source_delay: Duration,
    pub notification_delay: Duration,
}

impl MonitorLimits {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            extract: ExtractLimits::from(&cfg.monitor),
            max_notifications_per_run: cfg.monitor.max_notifications_per_run,
            recent_limit: cfg.monitor.recent_limit,
            source_delay: Duration::from_millis(cfg.politeness.delay_between_sources_ms),
            notification_delay: Duration::from_millis(cfg.politeness.delay_between_notifications_ms),
        }
    }
}

/// Summary of one news check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub checked_at: DateTime<Utc>,
    /// Unique AI articles found across all sources
    pub fetched: usize,
    /// Of those, how many had not been sent before
    pub new_articles: usize,
    /// Articles delivered to at least one channel and recorded
    pub notified: usize,
    /// Articles no channel accepted, or delivered but not recorded
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
}

/// Fetch → filter → dedup → notify → record.
pub struct NewsMonitor {
    pool: SqlitePool,
    fetcher: FeedFetcher,
    sources: Vec<SourceConfig>,
    filter: KeywordFilter,
    hub: NotificationHub,
    limits: MonitorLimits,
    check_lock: Mutex<()>,
    last_report: RwLock<Option<CheckReport>>,
}

impl NewsMonitor {
    pub fn new(
        pool: SqlitePool,
        fetcher: FeedFetcher,
        sources: Vec<SourceConfig>,
        filter: KeywordFilter,
        hub: NotificationHub,
        limits: MonitorLimits,
    ) -> Self {
        Self {
            pool,
            fetcher,
            sources,
            filter,
            hub,
            limits,
            check_lock: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    /// Wire a monitor from the application configuration.
    pub fn from_config(cfg: &Config, pool: SqlitePool) -> Result<Self> {
        let fetcher = FeedFetcher::from_config(&cfg.politeness)?;
        let hub = NotificationHub::from_config(&cfg.notifications)?;
        let filter = KeywordFilter::new(&cfg.monitor.keywords);
        if filter.is_empty() {
            warn!("No keywords configured; no article will match");
        }
        info!(
            sources = cfg.sources.len(),
            keywords = filter.len(),
            channels = ?hub.channel_names(),
            "news monitor initialized"
        );
        Ok(Self::new(
            pool,
            fetcher,
            cfg.sources.clone(),
            filter,
            hub,
            MonitorLimits::from_config(cfg),
        ))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.hub.channel_names()
    }

    pub async fn last_report(&self) -> Option<CheckReport> {
        self.last_report.read().await.clone()
    }

    /// AI articles from a single source.
    pub async fn fetch_source(&self, source: &SourceConfig) -> Result<Vec<Article>> {
        info!("Fetching from {}...", source.name);
        let feed = self
            .fetcher
            .fetch(&source.url)
            .await
            .with_context(|| format!("failed to fetch source {}", source.name))?;

        if feed.entries.is_empty() {
            info!("No entries found for {}", source.name);
            return Ok(Vec::new());
        }

        let articles = extract_articles(&source.name, &feed, &self.filter, self.limits.extract);
        info!("Found {} AI articles from {}", articles.len(), source.name);
        Ok(articles)
    }

    /// AI articles from every source, deduplicated and newest first.
    /// A failing source is logged and skipped.
    pub async fn fetch_all(&self) -> Vec<Article> {
        let mut all = Vec::new();

        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 && !self.limits.source_delay.is_zero() {
                tokio::time::sleep(self.limits.source_delay).await;
            }
            match self.fetch_source(source).await {
                Ok(articles) => all.extend(articles),
                Err(e) => error!("Error fetching from {}: {:#}", source.name, e),
            }
        }

        let sorted = dedup_and_sort(all, Utc::now());
        info!("Total unique AI articles found: {}", sorted.len());
        sorted
    }

    async fn is_sent(&self, article: &Article) -> bool {
        storage::is_article_sent(&self.pool, &article.hash)
            .await
            .unwrap_or_else(|e| {
                warn!("sent-check failed for {}: {:#}", article.hash, e);
                false
            })
    }

    /// Run one news check: notify the newest unsent articles and record them.
    /// Calls are serialised so overlapping triggers never send an article twice.
    pub async fn process_new_articles(&self) -> CheckReport {
        let _guard = self.check_lock.lock().await;
        let checked_at = Utc::now();
        info!("=== Checking for new AI news - {} ===", checked_at.format("%Y-%m-%d %H:%M:%S"));

        let articles = self.fetch_all().await;

        let mut new_articles = Vec::new();
        for article in articles.iter() {
            if !self.is_sent(article).await {
                new_articles.push(article);
            }
        }
        info!("Found {} new articles", new_articles.len());

        if self.hub.is_empty() && !new_articles.is_empty() {
            warn!("No notification channels configured; new articles stay unsent");
        }

        let mut notified = 0;
        let mut failed = 0;
        let batch: Vec<&Article> = new_articles
            .iter()
            .take(self.limits.max_notifications_per_run)
            .copied()
            .collect();

        for (i, article) in batch.iter().enumerate() {
            if i > 0 && !self.limits.notification_delay.is_zero() {
                tokio::time::sleep(self.limits.notification_delay).await;
            }

            let outcome = self.hub.dispatch(&Alert::for_article(article)).await;
            if !outcome.any_delivered() {
                warn!("No notifications sent for: {}", article.title);
                failed += 1;
                continue;
            }

            match storage::mark_article_sent(&self.pool, article).await {
                Ok(_) => {
                    info!("Sent: {} (via {:?})", article.title, outcome.delivered);
                    notified += 1;
                }
                Err(e) => {
                    // delivered but unrecorded, so the next check sends it again
                    error!("Failed to mark as sent: {}: {:#}", article.title, e);
                    failed += 1;
                }
            }
        }

        let report = CheckReport {
            checked_at,
            fetched: articles.len(),
            new_articles: new_articles.len(),
            notified,
            failed,
        };
        info!("Successfully sent {} notifications", notified);
        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// Current articles annotated with their delivery state.
    pub async fn recent_articles(&self) -> Result<Vec<ArticleView>> {
        let articles = self.fetch_all().await;
        let mut views = Vec::with_capacity(articles.len().min(self.limits.recent_limit));
        for article in articles.into_iter().take(self.limits.recent_limit) {
            let sent = storage::is_article_sent(&self.pool, &article.hash)
                .await
                .context("failed to read delivery state")?;
            views.push(ArticleView { article, sent });
        }
        Ok(views)
    }

    /// Push the canned test alert through every channel.
    pub async fn send_test_notification(&self) -> TestOutcome {
        let outcome = self.hub.dispatch(&Alert::test()).await;
        let success = outcome.any_delivered();
        TestOutcome {
            success,
            message: if success {
                "Test notification sent successfully!".to_string()
            } else if self.hub.is_empty() {
                "No notification services configured".to_string()
            } else {
                "All notification services failed".to_string()
            },
        }
    }
}
