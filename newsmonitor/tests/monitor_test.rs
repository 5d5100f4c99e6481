use std::sync::Arc;
use std::time::Duration;

use common::SourceConfig;
use newsmonitor::articles::{ExtractLimits, KeywordFilter};
use newsmonitor::ingestion::FeedFetcher;
use newsmonitor::monitor::{MonitorLimits, NewsMonitor};
use newsmonitor::notify::{NotificationHub, Notifier, WebhookNotifier};
use newsmonitor::scheduler::{run_worker, Schedule};
use newsmonitor::storage;
use tokio::sync::Notify;

fn rss(items: &[(&str, &str, &str, &str)]) -> String {
    let mut body = String::from(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Test feed</title>"#);
    for (title, link, description, date) in items {
        body.push_str(&format!(
            "<item><title>{}</title><link>{}</link><description>{}</description><pubDate>{}</pubDate></item>",
            title, link, description, date
        ));
    }
    body.push_str("</channel></rss>");
    body
}

fn limits(max_notifications: usize) -> MonitorLimits {
    MonitorLimits {
        extract: ExtractLimits {
            entries_per_feed: 5,
            summary_max_chars: 200,
        },
        max_notifications_per_run: max_notifications,
        recent_limit: 20,
        source_delay: Duration::ZERO,
        notification_delay: Duration::ZERO,
    }
}

fn webhook_hub(url: String) -> NotificationHub {
    let channel: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(reqwest::Client::new(), url));
    NotificationHub::new(vec![channel])
}

async fn build_monitor(sources: Vec<SourceConfig>, hub: NotificationHub, max_notifications: usize) -> NewsMonitor {
    let pool = common::open_memory_pool().await.expect("pool");
    common::ensure_schema(&pool).await.expect("schema");
    let fetcher = FeedFetcher::new("test-agent", Duration::from_secs(5), 1).expect("fetcher");
    NewsMonitor::new(
        pool,
        fetcher,
        sources,
        KeywordFilter::new(["openai", "machine learning"]),
        hub,
        limits(max_notifications),
    )
}

fn source(name: &str, url: String) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        url,
    }
}

const AI_FEED: &[(&str, &str, &str, &str)] = &[
    (
        "OpenAI ships a new model",
        "https://example.com/openai",
        "Details inside",
        "Tue, 10 Mar 2026 10:00:00 GMT",
    ),
    (
        "Local bakery wins award",
        "https://example.com/bread",
        "Sourdough",
        "Tue, 10 Mar 2026 11:00:00 GMT",
    ),
    (
        "Startups bet on edge inference",
        "https://example.com/edge",
        "A machine learning story",
        "Tue, 10 Mar 2026 09:00:00 GMT",
    ),
];

#[tokio::test]
async fn check_notifies_new_ai_articles_exactly_once() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(rss(AI_FEED))
        .create_async()
        .await;
    let hook = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let monitor = build_monitor(
        vec![source("Example", format!("{}/feed", server.url()))],
        webhook_hub(format!("{}/hook", server.url())),
        3,
    )
    .await;

    let first = monitor.process_new_articles().await;
    assert_eq!(first.fetched, 2);
    assert_eq!(first.new_articles, 2);
    assert_eq!(first.notified, 2);
    assert_eq!(first.failed, 0);

    let second = monitor.process_new_articles().await;
    assert_eq!(second.fetched, 2);
    assert_eq!(second.new_articles, 0);
    assert_eq!(second.notified, 0);

    hook.assert_async().await;
    assert_eq!(storage::sent_count(monitor.pool()).await.unwrap(), 2);

    let history = storage::recent_sent(monitor.pool(), 10).await.unwrap();
    let titles: Vec<&str> = history.iter().map(|s| s.title.as_str()).collect();
    assert!(titles.contains(&"OpenAI ships a new model"));
    assert!(titles.contains(&"Startups bet on edge inference"));
    assert_eq!(monitor.last_report().await.unwrap().notified, 0);
}

#[tokio::test]
async fn per_run_cap_defers_the_rest_to_the_next_check() {
    let mut server = mockito::Server::new_async().await;
    let items = [
        ("OpenAI one", "https://example.com/1", "x", "Tue, 10 Mar 2026 04:00:00 GMT"),
        ("OpenAI two", "https://example.com/2", "x", "Tue, 10 Mar 2026 03:00:00 GMT"),
        ("OpenAI three", "https://example.com/3", "x", "Tue, 10 Mar 2026 02:00:00 GMT"),
    ];
    let _feed = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_body(rss(&items))
        .create_async()
        .await;
    let _hook = server.mock("POST", "/hook").with_status(204).create_async().await;

    let monitor = build_monitor(
        vec![source("Example", format!("{}/feed", server.url()))],
        webhook_hub(format!("{}/hook", server.url())),
        2,
    )
    .await;

    let first = monitor.process_new_articles().await;
    assert_eq!(first.new_articles, 3);
    assert_eq!(first.notified, 2);

    // newest first, so only the oldest is left over
    let views = monitor.recent_articles().await.unwrap();
    let unsent: Vec<&str> = views.iter().filter(|v| !v.sent).map(|v| v.article.title.as_str()).collect();
    assert_eq!(unsent, vec!["OpenAI three"]);

    let second = monitor.process_new_articles().await;
    assert_eq!(second.new_articles, 1);
    assert_eq!(second.notified, 1);
}

#[tokio::test]
async fn undelivered_articles_stay_unsent() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_body(rss(AI_FEED))
        .create_async()
        .await;
    let _hook = server.mock("POST", "/hook").with_status(500).create_async().await;

    let monitor = build_monitor(
        vec![source("Example", format!("{}/feed", server.url()))],
        webhook_hub(format!("{}/hook", server.url())),
        3,
    )
    .await;

    let report = monitor.process_new_articles().await;
    assert_eq!(report.notified, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(storage::sent_count(monitor.pool()).await.unwrap(), 0);

    // without any channel nothing is recorded either
    let silent = build_monitor(
        vec![source("Example", format!("{}/feed", server.url()))],
        NotificationHub::default(),
        3,
    )
    .await;
    let report = silent.process_new_articles().await;
    assert_eq!(report.new_articles, 2);
    assert_eq!(report.notified, 0);
    assert_eq!(storage::sent_count(silent.pool()).await.unwrap(), 0);

    let outcome = silent.send_test_notification().await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, "No notification services configured");
}

#[tokio::test]
async fn delivered_but_unrecorded_articles_count_as_failed() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_body(rss(AI_FEED))
        .create_async()
        .await;
    let hook = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let monitor = build_monitor(
        vec![source("Example", format!("{}/feed", server.url()))],
        webhook_hub(format!("{}/hook", server.url())),
        3,
    )
    .await;
    monitor.pool().close().await;

    let report = monitor.process_new_articles().await;
    assert_eq!(report.new_articles, 2);
    assert_eq!(report.notified, 0);
    assert_eq!(report.failed, 2);
    hook.assert_async().await;
}

#[tokio::test]
async fn failing_source_does_not_stop_the_others() {
    let mut server = mockito::Server::new_async().await;
    let _broken = server.mock("GET", "/broken").with_status(404).create_async().await;
    let _good = server
        .mock("GET", "/good")
        .with_status(200)
        .with_body(rss(AI_FEED))
        .create_async()
        .await;

    let monitor = build_monitor(
        vec![
            source("Broken", format!("{}/broken", server.url())),
            source("Good", format!("{}/good", server.url())),
        ],
        NotificationHub::default(),
        3,
    )
    .await;

    let articles = monitor.fetch_all().await;
    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].title, "OpenAI ships a new model");
    assert!(articles.iter().all(|a| a.source == "Good"));
}

#[tokio::test]
async fn duplicate_entries_across_sources_are_notified_once() {
    let mut server = mockito::Server::new_async().await;
    let body = rss(&AI_FEED[..1]);
    let _a = server.mock("GET", "/a").with_status(200).with_body(body.clone()).create_async().await;
    let _b = server.mock("GET", "/b").with_status(200).with_body(body).create_async().await;
    let hook = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let monitor = build_monitor(
        vec![
            source("A", format!("{}/a", server.url())),
            source("B", format!("{}/b", server.url())),
        ],
        webhook_hub(format!("{}/hook", server.url())),
        3,
    )
    .await;

    let report = monitor.process_new_articles().await;
    assert_eq!(report.fetched, 1);
    assert_eq!(report.notified, 1);
    hook.assert_async().await;
}

#[tokio::test]
async fn worker_runs_on_start_and_stops_on_shutdown() {
    let mut server = mockito::Server::new_async().await;
    let _feed = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_body(rss(AI_FEED))
        .create_async()
        .await;

    let monitor = Arc::new(
        build_monitor(
            vec![source("Example", format!("{}/feed", server.url()))],
            NotificationHub::default(),
            3,
        )
        .await,
    );
    let shutdown = Arc::new(Notify::new());

    let handle = tokio::spawn(run_worker(
        monitor.clone(),
        Schedule::new(Some(chrono::Duration::hours(1)), vec![]),
        Duration::from_secs(1),
        true,
        shutdown.clone(),
    ));

    // the startup check finishing means the worker is already listening
    tokio::time::timeout(Duration::from_secs(10), async {
        while monitor.last_report().await.is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("startup check never ran");

    shutdown.notify_waiters();
    let res = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .expect("worker panicked");
    assert!(res.is_ok());
    assert_eq!(monitor.last_report().await.unwrap().fetched, 2);
}
