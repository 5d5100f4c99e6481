/*!
common/src/lib.rs

Shared configuration types and DB helper functions for the AI News Monitor.

This file provides:
- Config data structures (deserialized from TOML, every section optional)
- An async loader that merges a default and an override TOML file
- Environment overrides and secret lookup
- Helpers to open the SQLite database and ensure its schema
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/ai_news.db")
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/ai_news.db".to_string(),
        }
    }
}

/// When news checks run: a fixed interval plus wall-clock times.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minutes between interval checks; 0 disables the interval job
    pub interval_minutes: u64,
    /// Wall-clock times in "HH:MM" 24h format (local time)
    pub times: Vec<String>,
    /// Upper bound on how long the worker sleeps between schedule evaluations
    pub tick_seconds: u64,
    /// Run one check as soon as the worker starts
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            times: vec!["08:00".into(), "12:00".into(), "18:00".into()],
            tick_seconds: 60,
            run_on_start: false,
        }
    }
}

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5006,
        }
    }
}

/// Politeness / fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    pub fetch_timeout_seconds: u64,
    pub max_retries: u32,
    pub delay_between_sources_ms: u64,
    pub delay_between_notifications_ms: u64,
    pub user_agent: String,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_seconds: 30,
            max_retries: 3,
            delay_between_sources_ms: 1000,
            delay_between_notifications_ms: 2000,
            user_agent: "Mozilla/5.0 (compatible; AI News Monitor/1.0)".to_string(),
        }
    }
}

/// Filtering and delivery limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Only the first N entries of each feed are considered
    pub entries_per_feed: usize,
    /// Summaries longer than this many characters are cut and suffixed with "..."
    pub summary_max_chars: usize,
    /// Cap on notifications per check, to avoid flooding
    pub max_notifications_per_run: usize,
    /// Number of articles returned by the articles listing
    pub recent_limit: usize,
    /// Case-insensitive phrases that mark an entry as AI news
    pub keywords: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            entries_per_feed: 5,
            summary_max_chars: 200,
            max_notifications_per_run: 3,
            recent_limit: 20,
            keywords: default_keywords(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    [
        "artificial intelligence",
        "machine learning",
        "deep learning",
        "neural network",
        "chatgpt",
        "gpt-4",
        "gpt-5",
        "claude",
        "gemini",
        "openai",
        "anthropic",
        "google ai",
        "ai regulation",
        "ai policy",
        "ai governance",
        "ai safety",
        "ai ethics",
        "enterprise ai",
        "ai adoption",
        "ai investment",
        "ai funding",
        "ai startup",
        "large language model",
        "llm",
        "foundation model",
        "generative ai",
        "microsoft copilot",
        "github copilot",
        "ai assistant",
        "ai agent",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

/// A named RSS/Atom source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
}

impl SourceConfig {
    fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "TechCrunch AI",
            "https://techcrunch.com/category/artificial-intelligence/feed/",
        ),
        SourceConfig::new("VentureBeat AI", "https://venturebeat.com/ai/feed/"),
        SourceConfig::new(
            "The Verge AI",
            "https://www.theverge.com/ai-artificial-intelligence/rss/index.xml",
        ),
        SourceConfig::new("AI News", "https://artificialintelligence-news.com/feed/"),
        SourceConfig::new(
            "Ars Technica",
            "https://feeds.arstechnica.com/arstechnica/technology-lab",
        ),
    ]
}

/// Notification channels. Secrets never live in the file, only the names of
/// the environment variables holding them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub pushover_token_env: String,
    pub pushover_user_env: String,
    pub webhook_url_env: String,
    pub pushover_api_url: String,
    pub timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            pushover_token_env: "PUSHOVER_TOKEN".to_string(),
            pushover_user_env: "PUSHOVER_USER".to_string(),
            webhook_url_env: "WEBHOOK_URL".to_string(),
            pushover_api_url: "https://api.pushover.net/1/messages.json".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Remote LLM config (used if `llm.adapter = "remote"`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
}

/// LLM config for briefings and sentiment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub adapter: Option<String>, // "remote", "none"
    pub remote: Option<RemoteLlmConfig>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
    pub politeness: PolitenessConfig,
    pub monitor: MonitorConfig,
    pub sources: Vec<SourceConfig>,
    pub notifications: NotificationConfig,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            server: ServerConfig::default(),
            politeness: PolitenessConfig::default(),
            monitor: MonitorConfig::default(),
            sources: default_sources(),
            notifications: NotificationConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence). Files that
    /// do not exist are skipped.
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Apply `PORT` and `DATABASE_PATH` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!(value = %port, "ignoring invalid PORT override"),
            }
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            self.database.path = path;
        }
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Read a secret from the environment. Blank values count as unset.
pub fn resolve_secret(env_name: &str) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary, ensure the DB file exists
/// (attempting to create it if missing), and return a configured `SqlitePool`.
///
/// Example:
///   let pool = init_db_pool("data/ai_news.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    // Creating the file up front surfaces permission or path problems with a clearer
    // error than the SQLite connection attempt would give.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

/// Open a private in-memory database.
///
/// The pool holds exactly one connection that never expires: every SQLite
/// in-memory connection is its own database.
pub async fn open_memory_pool() -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory sqlite database")
}

/// Open the on-disk database, falling back to an in-memory one when that fails.
/// The monitor keeps working without persistence; sent-tracking then lasts for
/// the life of the process only.
pub async fn init_db_pool_or_memory(path: &str) -> Result<SqlitePool> {
    match init_db_pool(path).await {
        Ok(pool) => Ok(pool),
        Err(e) => {
            warn!(db_path = %path, error = %format!("{:#}", e), "database unavailable, using in-memory database");
            open_memory_pool().await
        }
    }
}

/// Ensure the required schema exists. Idempotent and safe to call at startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sent_articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_hash TEXT UNIQUE NOT NULL,
            title TEXT NOT NULL,
            source TEXT NOT NULL,
            sent_at TIMESTAMP NOT NULL,
            url TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create sent_articles table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sent_articles_sent_at ON sent_articles (sent_at)")
        .execute(pool)
        .await
        .context("failed to create sent_articles index")?;

    info!("database schema ensured");
    Ok(())
}
