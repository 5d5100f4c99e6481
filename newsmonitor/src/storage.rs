use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::articles::Article;

/// A row of the sent-article ledger.
#[derive(Debug, Clone, Serialize)]
pub struct SentArticle {
    pub id: i64,
    pub article_hash: String,
    pub title: String,
    pub source: String,
    pub url: String,
    pub sent_at: DateTime<Utc>,
}

/// Whether an article with this hash was already delivered.
pub async fn is_article_sent(pool: &SqlitePool, article_hash: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM sent_articles WHERE article_hash = ?")
        .bind(article_hash)
        .fetch_optional(pool)
        .await
        .context("failed to check sent article")?;
    Ok(found.is_some())
}

/// Record an article as delivered. Returns false when it was already recorded.
pub async fn mark_article_sent(pool: &SqlitePool, article: &Article) -> Result<bool> {
    let res = sqlx::query(
        r#"
        INSERT OR IGNORE INTO sent_articles (article_hash, title, source, sent_at, url)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.hash)
    .bind(&article.title)
    .bind(&article.source)
    .bind(Utc::now())
    .bind(&article.url)
    .execute(pool)
    .await
    .context("failed to insert sent article")?;

    let inserted = res.rows_affected() > 0;
    if !inserted {
        debug!("article {} was already marked as sent", article.hash);
    }
    Ok(inserted)
}

pub async fn sent_count(pool: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM sent_articles")
        .fetch_one(pool)
        .await
        .context("failed to count sent articles")
}

pub async fn sent_count_since(pool: &SqlitePool, since: DateTime<Utc>) -> Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM sent_articles WHERE sent_at >= ?")
        .bind(since)
        .fetch_one(pool)
        .await
        .context("failed to count recent sent articles")
}

/// Most recently delivered articles, newest first.
pub async fn recent_sent(pool: &SqlitePool, limit: i64) -> Result<Vec<SentArticle>> {
    let rows = sqlx::query(
        r#"
        SELECT id, article_hash, title, source, url, sent_at
        FROM sent_articles
        ORDER BY sent_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list sent articles")?;

    rows.into_iter()
        .map(|r| {
            Ok(SentArticle {
                id: r.try_get("id")?,
                article_hash: r.try_get("article_hash")?,
                title: r.try_get("title")?,
                source: r.try_get("source")?,
                url: r.try_get("url")?,
                sent_at: r.try_get("sent_at")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .context("failed to decode sent article row")
}
