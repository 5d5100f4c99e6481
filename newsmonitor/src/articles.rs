//! Turning feed entries into AI-relevant articles.
//!
//! An article's identity is a hash of its trimmed title and URL, which is what
//! deduplication across sources and the sent ledger key on.

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

/// An AI-related news item ready for notification.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published: Option<DateTime<Utc>>,
    pub summary: String,
    pub hash: String,
}

/// An article as shown by the API, with its delivery state.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleView {
    #[serde(flatten)]
    pub article: Article,
    pub sent: bool,
}

/// Limits applied while extracting articles from a feed.
#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    pub entries_per_feed: usize,
    pub summary_max_chars: usize,
}

impl From<&common::MonitorConfig> for ExtractLimits {
    fn from(cfg: &common::MonitorConfig) -> Self {
        Self {
            entries_per_feed: cfg.entries_per_feed,
            summary_max_chars: cfg.summary_max_chars,
        }
    }
}

/// Stable identity for an article: hex SHA-256 of trimmed title + trimmed URL.
pub fn article_hash(title: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(url.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Case-insensitive keyword relevance check.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn matches(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl Article {
    /// Build an article from a feed entry if it has a title and link and is
    /// about AI. The summary is reduced to plain text and capped at
    /// `summary_max_chars` characters.
    pub fn from_entry(
        source: &str,
        entry: &Entry,
        filter: &KeywordFilter,
        summary_max_chars: usize,
    ) -> Option<Article> {
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();
        let url = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();

        if title.is_empty() || url.is_empty() {
            debug!("Skipping entry without title or link from {}", source);
            return None;
        }

        let raw_summary = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .unwrap_or_default();
        let summary = plain_text(&raw_summary);

        if !filter.matches(&format!("{} {}", title, summary)) {
            return None;
        }

        let summary = if summary.chars().count() > summary_max_chars {
            format!("{}...", truncate_chars(&summary, summary_max_chars))
        } else {
            summary
        };

        Some(Article {
            hash: article_hash(&title, &url),
            published: entry.published.or(entry.updated),
            title,
            url,
            source: source.to_string(),
            summary,
        })
    }
}

/// Articles from the first `entries_per_feed` entries of a feed.
pub fn extract_articles(
    source: &str,
    feed: &Feed,
    filter: &KeywordFilter,
    limits: ExtractLimits,
) -> Vec<Article> {
    feed.entries
        .iter()
        .take(limits.entries_per_feed)
        .filter_map(|entry| Article::from_entry(source, entry, filter, limits.summary_max_chars))
        .collect()
}

/// Drop repeated hashes (first occurrence wins) and order newest first.
/// Undated articles are treated as published now, so they lead the list.
pub fn dedup_and_sort(articles: Vec<Article>, now: DateTime<Utc>) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Article> = articles
        .into_iter()
        .filter(|a| seen.insert(a.hash.clone()))
        .collect();

    // sort_by is stable, so equal timestamps keep source order
    unique.sort_by(|a, b| {
        let a_key = a.published.unwrap_or(now);
        let b_key = b.published.unwrap_or(now);
        b_key.cmp(&a_key)
    });
    unique
}

/// First `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Feed summaries are frequently HTML fragments.
fn plain_text(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return collapse_whitespace(raw);
    }
    match html2text::from_read(raw.as_bytes(), 10_000) {
        Ok(text) => collapse_whitespace(&text),
        Err(e) => {
            debug!("html2text failed, keeping raw summary: {}", e);
            collapse_whitespace(raw)
        }
    }
}
