/*
newsmonitor - single-binary main.rs
This binary starts the Rocket HTTP server and runs the news-check scheduler inside the same process.
*/

use clap::Parser;
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newsmonitor::llm::{self, briefing::BriefingService};
use newsmonitor::monitor::NewsMonitor;
use newsmonitor::scheduler::{self, Schedule};
use newsmonitor::server::{launch_rocket, AppState};

#[derive(Parser, Debug)]
#[command(name = "newsmonitor", about = "AI news monitor: HTTP server + scheduled news checks")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable background worker (run server only)
    #[arg(long)]
    no_worker: bool,

    /// Run worker only (do not bind HTTP server)
    #[arg(long)]
    worker_only: bool,

    /// Run a single news check and exit
    #[arg(long, conflicts_with_all = ["no_worker", "worker_only"])]
    once: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Secrets usually live in .env next to the binary
    let dotenv_loaded = dotenv::dotenv().is_ok();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    if !dotenv_loaded {
        info!("no .env file found, using process environment only");
    }

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    // Load configuration with defaults
    let mut config = match Config::load_with_defaults(Some(&default_path), override_path.as_deref()).await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %format!("{:#}", e), "failed to load configuration");
            return Err(e);
        }
    };
    config.apply_env_overrides();
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let schedule = Schedule::from_config(&config.scheduler)?;

    // Initialize DB pool - resolve and log the absolute DB path before connecting
    let db_path_abs = match tokio::fs::canonicalize(&config.database.path).await {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => config.database.path.clone(),
    };
    info!(db_path = %db_path_abs, "resolved DB path");

    let db_pool = common::init_db_pool_or_memory(&db_path_abs).await?;
    common::ensure_schema(&db_pool).await?;

    let monitor = Arc::new(NewsMonitor::from_config(&config, db_pool)?);

    let provider = match llm::create_llm_provider(&config.llm) {
        Ok(p) => p,
        Err(e) => {
            warn!("LLM provider unavailable, briefings run in demo mode: {:#}", e);
            None
        }
    };
    let briefings = Arc::new(BriefingService::new(provider));

    if args.once {
        info!("Running a single news check");
        let report = monitor.process_new_articles().await;
        info!(
            fetched = report.fetched,
            new_articles = report.new_articles,
            notified = report.notified,
            failed = report.failed,
            "single check finished"
        );
        return Ok(());
    }

    // Prepare a shutdown notifier to signal worker tasks
    let shutdown_notify = Arc::new(Notify::new());
    let tick = Duration::from_secs(config.scheduler.tick_seconds);
    let run_on_start = config.scheduler.run_on_start;

    // If worker_only, run the worker (without HTTP) until Ctrl-C
    if args.worker_only {
        info!("Starting in worker-only mode");
        let worker = scheduler::run_worker(
            monitor.clone(),
            schedule,
            tick,
            run_on_start,
            shutdown_notify.clone(),
        );
        tokio::pin!(worker);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, notifying worker to shutdown");
                shutdown_notify.notify_waiters();
                // give worker a small grace period
                if tokio::time::timeout(Duration::from_secs(5), &mut worker).await.is_err() {
                    info!("worker still busy after grace period; exiting");
                }
            }
            res = &mut worker => {
                if let Err(e) = res {
                    error!(error = %format!("{:#}", e), "worker encountered an error");
                }
            }
        }
        info!("worker-only run finished");
        return Ok(());
    }

    // Otherwise, start worker (unless disabled) and then start HTTP server.
    let mut worker_handle = None;
    if !args.no_worker {
        info!("Spawning background worker task");
        let w_monitor = monitor.clone();
        let w_shutdown = shutdown_notify.clone();
        worker_handle = Some(tokio::spawn(async move {
            let res = scheduler::run_worker(w_monitor, schedule, tick, run_on_start, w_shutdown).await;
            if let Err(e) = &res {
                error!(error = %format!("{:#}", e), "background worker failed");
            }
            res
        }));
    } else {
        info!("Background worker disabled via CLI (--no-worker)");
    }

    // Launch the Rocket server (blocking until Rocket shuts down)
    info!("Launching Rocket HTTP server");
    let state = AppState::new(Arc::new(config), monitor, briefings);
    if let Err(e) = launch_rocket(state).await {
        error!(error = %format!("{:#}", e), "Rocket server failed");
    }

    // When the server shuts down, notify worker and wait a bit for graceful termination.
    info!("HTTP server stopped; notifying worker to shutdown");
    shutdown_notify.notify_waiters();

    if let Some(handle) = worker_handle {
        match tokio::time::timeout(Duration::from_secs(20), handle).await {
            Ok(join_res) => match join_res {
                Ok(Ok(_)) => info!("worker exited cleanly"),
                Ok(Err(e)) => error!(error = %format!("{:#}", e), "worker task returned an error"),
                Err(join_err) => error!(%join_err, "worker task panicked"),
            },
            Err(_) => {
                info!("Timed out waiting for worker to exit; continuing shutdown");
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        let args = Args::parse_from(["newsmonitor", "--once", "--log-level", "debug"]);
        assert!(args.once);
        assert_eq!(args.log_level, "debug");

        let args = Args::parse_from(["newsmonitor", "--worker-only", "--config", "custom.toml"]);
        assert!(args.worker_only);
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));

        assert!(Args::try_parse_from(["newsmonitor", "--once", "--worker-only"]).is_err());
    }
}
