use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::figment::Figment;
use rocket::http::{Header, Status};
use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::{get, options, post, routes, Build, Request, Response, Rocket, State};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use common::Config;

use crate::llm::briefing::{Briefing, BriefingService};
use crate::monitor::{CheckReport, NewsMonitor, TestOutcome};
use crate::storage;

const DEFAULT_SENT_LIMIT: i64 = 50;
const MAX_SENT_LIMIT: i64 = 500;

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub config: Arc<Config>,
    pub monitor: Arc<NewsMonitor>,
    pub briefings: Arc<BriefingService>,
}

impl AppState {
    pub fn new(config: Arc<Config>, monitor: Arc<NewsMonitor>, briefings: Arc<BriefingService>) -> Self {
        Self {
            started_at: Utc::now(),
            config,
            monitor,
            briefings,
        }
    }
}

/// Open CORS so phone shortcuts and other origins can call the API.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _req: &'r Request<'_>, res: &mut Response<'r>) {
        res.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        res.set_header(Header::new("Access-Control-Allow-Methods", "GET, POST, OPTIONS"));
        res.set_header(Header::new("Access-Control-Allow-Headers", "Content-Type"));
    }
}

#[derive(Serialize)]
struct ScheduleInfo {
    interval_minutes: u64,
    times: Vec<String>,
}

/// Response structure for `/api/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    sources: usize,
    channels: Vec<&'static str>,
    llm: &'static str,
    scheduler: ScheduleInfo,
    sent_total: i64,
    sent_last_24h: i64,
    last_check: Option<CheckReport>,
}

#[get("/")]
async fn dashboard() -> RawHtml<&'static str> {
    RawHtml(include_str!("../static/index.html"))
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

#[options("/<_..>")]
async fn preflight() -> Status {
    Status::NoContent
}

#[get("/api/status")]
async fn status(state: &State<AppState>) -> Result<Json<StatusResponse>, Status> {
    let now = Utc::now();
    let pool = state.monitor.pool();

    let sent_total = storage::sent_count(pool).await.map_err(|e| {
        error!("status: failed to count sent articles: {:#}", e);
        Status::InternalServerError
    })?;
    let sent_last_24h = storage::sent_count_since(pool, now - Duration::hours(24))
        .await
        .map_err(|e| {
            error!("status: failed to count recent sent articles: {:#}", e);
            Status::InternalServerError
        })?;

    Ok(Json(StatusResponse {
        status: "ok",
        uptime_seconds: (now - state.started_at).num_seconds(),
        sources: state.monitor.sources().len(),
        channels: state.monitor.channel_names(),
        llm: if state.briefings.is_demo() { "demo" } else { "enabled" },
        scheduler: ScheduleInfo {
            interval_minutes: state.config.scheduler.interval_minutes,
            times: state.config.scheduler.times.clone(),
        },
        sent_total,
        sent_last_24h,
        last_check: state.monitor.last_report().await,
    }))
}

#[get("/api/articles")]
async fn articles(state: &State<AppState>) -> (Status, Json<Value>) {
    match state.monitor.recent_articles().await {
        Ok(articles) => (
            Status::Ok,
            Json(json!({
                "count": articles.len(),
                "articles": articles,
                "timestamp": Utc::now().to_rfc3339(),
                "success": true,
            })),
        ),
        Err(e) => {
            error!("Error in get_articles: {:#}", e);
            (
                Status::InternalServerError,
                Json(json!({
                    "error": format!("{:#}", e),
                    "articles": [],
                    "count": 0,
                    "success": false,
                })),
            )
        }
    }
}

#[post("/api/check-news")]
async fn check_news(state: &State<AppState>) -> Json<Value> {
    let report = state.monitor.process_new_articles().await;
    Json(json!({
        "success": true,
        "new_articles": report.new_articles,
        "notifications_sent": report.notified,
        "timestamp": report.checked_at.to_rfc3339(),
    }))
}

#[post("/api/test-notification")]
async fn test_notification(state: &State<AppState>) -> Json<TestOutcome> {
    Json(state.monitor.send_test_notification().await)
}

#[get("/api/sent?<limit>")]
async fn sent_history(state: &State<AppState>, limit: Option<i64>) -> Result<Json<Value>, Status> {
    let limit = limit.unwrap_or(DEFAULT_SENT_LIMIT).clamp(1, MAX_SENT_LIMIT);
    let rows = storage::recent_sent(state.monitor.pool(), limit)
        .await
        .map_err(|e| {
            error!("sent history query failed: {:#}", e);
            Status::InternalServerError
        })?;
    Ok(Json(json!({ "count": rows.len(), "sent": rows })))
}

#[get("/api/briefings")]
async fn briefings(state: &State<AppState>) -> Json<Briefing> {
    let articles = state.monitor.fetch_all().await;
    Json(state.briefings.generate(&articles).await)
}

#[get("/api/shortcuts/latest")]
async fn shortcut_latest(state: &State<AppState>) -> (Status, String) {
    match state.monitor.recent_articles().await {
        Ok(views) => match views.first() {
            Some(view) => {
                let a = &view.article;
                (
                    Status::Ok,
                    format!(
                        "Latest AI News:\n\n{}\n\nSource: {}\n\n{}\n\nRead more: {}",
                        a.title, a.source, a.summary, a.url
                    ),
                )
            }
            None => (Status::Ok, "No recent AI news found".to_string()),
        },
        Err(e) => {
            error!("shortcut latest failed: {:#}", e);
            (Status::InternalServerError, format!("AI News Monitor error: {:#}", e))
        }
    }
}

#[get("/api/shortcuts/voice")]
async fn shortcut_voice(state: &State<AppState>) -> String {
    let articles = state.monitor.fetch_all().await;
    state.briefings.generate(&articles).await.voice_text
}

/// Assemble the Rocket instance without launching it.
pub fn build_rocket(state: AppState, figment: Figment) -> Rocket<Build> {
    rocket::custom(figment).manage(state).attach(Cors).mount(
        "/",
        routes![
            dashboard,
            health,
            preflight,
            status,
            articles,
            check_news,
            test_notification,
            sent_history,
            briefings,
            shortcut_latest,
            shortcut_voice,
        ],
    )
}

/// Launch the HTTP server on `server.bind`/`server.port`.
///
/// Blocks until Rocket shuts down (Ctrl-C or SIGTERM) and returns an error if
/// Rocket fails to start.
pub async fn launch_rocket(state: AppState) -> Result<()> {
    let fig = rocket::Config::figment()
        .merge(("address", state.config.server.bind.clone()))
        .merge(("port", state.config.server.port));

    info!(
        "Starting Rocket HTTP server on {}:{}",
        state.config.server.bind, state.config.server.port
    );
    build_rocket(state, fig)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    info!("Rocket HTTP server has shut down");
    Ok(())
}
