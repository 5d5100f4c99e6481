// Fetch every configured source once and report how many AI articles each yields.
use std::path::PathBuf;

use common::Config;
use newsmonitor::articles::{extract_articles, ExtractLimits, KeywordFilter};
use newsmonitor::ingestion::FeedFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let override_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config.toml")));
    let config = Config::load_with_defaults(
        Some(PathBuf::from("config.default.toml").as_path()),
        override_path.as_deref(),
    )
    .await?;

    let fetcher = FeedFetcher::from_config(&config.politeness)?;
    let filter = KeywordFilter::new(&config.monitor.keywords);
    let limits = ExtractLimits::from(&config.monitor);

    for source in &config.sources {
        println!("\n{}", "=".repeat(60));
        println!("Testing: {} ({})", source.name, source.url);
        println!("{}", "=".repeat(60));

        match fetcher.fetch(&source.url).await {
            Ok(feed) => {
                let articles = extract_articles(&source.name, &feed, &filter, limits);
                println!("✓ Success!");
                println!("  Title: {:?}", feed.title.as_ref().map(|t| &t.content));
                println!("  Entries: {}", feed.entries.len());
                println!("  AI articles: {}", articles.len());
                for (i, article) in articles.iter().take(3).enumerate() {
                    println!("    {}. {}", i + 1, article.title);
                    println!("       URL: {}", article.url);
                }
            }
            Err(e) => {
                println!("✗ Failed: {:#}", e);
            }
        }
    }
    Ok(())
}
