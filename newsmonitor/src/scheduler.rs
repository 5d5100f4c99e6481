//! When news checks run.
//!
//! Two independent jobs drive the worker: a fixed interval (counted from the
//! last interval run) and a set of wall-clock times of day. If both are due on
//! the same tick only one check runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::monitor::NewsMonitor;

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    every: Option<chrono::Duration>,
    daily: Vec<NaiveTime>,
}

impl Schedule {
    pub fn new(every: Option<chrono::Duration>, mut daily: Vec<NaiveTime>) -> Self {
        daily.sort();
        daily.dedup();
        Self { every, daily }
    }

    pub fn from_config(cfg: &common::SchedulerConfig) -> Result<Self> {
        let daily = cfg
            .times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t.trim(), "%H:%M")
                    .with_context(|| format!("invalid scheduler time '{}', expected HH:MM", t))
            })
            .collect::<Result<Vec<_>>>()?;

        let every = (cfg.interval_minutes > 0)
            .then(|| chrono::Duration::minutes(cfg.interval_minutes as i64));

        Ok(Self::new(every, daily))
    }

    pub fn is_empty(&self) -> bool {
        self.every.is_none() && self.daily.is_empty()
    }

    /// Earliest configured time of day strictly after `after`, in `after`'s zone.
    /// Local times that do not exist (DST gaps) are skipped.
    pub fn next_daily_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let today = after.date_naive();

        for offset in 0..=2 {
            let day = today.checked_add_signed(chrono::Duration::days(offset))?;
            for time in &self.daily {
                if let Some(candidate) = tz.from_local_datetime(&day.and_time(*time)).earliest() {
                    if candidate > *after {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}

/// Upcoming run times for both jobs.
#[derive(Debug, Clone)]
pub struct Timetable<Tz: TimeZone> {
    schedule: Schedule,
    next_interval: Option<DateTime<Tz>>,
    next_daily: Option<DateTime<Tz>>,
}

impl<Tz: TimeZone> Timetable<Tz> {
    pub fn new(schedule: Schedule, now: DateTime<Tz>) -> Self {
        let next_interval = schedule.every.map(|every| now.clone() + every);
        let next_daily = schedule.next_daily_after(&now);
        Self {
            schedule,
            next_interval,
            next_daily,
        }
    }

    pub fn next_due(&self) -> Option<DateTime<Tz>> {
        match (&self.next_interval, &self.next_daily) {
            (Some(a), Some(b)) => Some(if a <= b { a.clone() } else { b.clone() }),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        }
    }

    /// Returns true when a check should run now, advancing whichever jobs fired.
    pub fn take_due(&mut self, now: &DateTime<Tz>) -> bool {
        let interval_due = self.next_interval.as_ref().map_or(false, |at| at <= now);
        let daily_due = self.next_daily.as_ref().map_or(false, |at| at <= now);

        if interval_due {
            self.next_interval = self.schedule.every.map(|every| now.clone() + every);
        }
        if daily_due {
            self.next_daily = self.schedule.next_daily_after(now);
        }
        interval_due || daily_due
    }
}

async fn run_check(monitor: &NewsMonitor) {
    let report = monitor.process_new_articles().await;
    info!(
        fetched = report.fetched,
        new_articles = report.new_articles,
        notified = report.notified,
        failed = report.failed,
        "worker: news check finished"
    );
}

/// Background worker entrypoint. Runs scheduled checks until `shutdown` is notified.
pub async fn run_worker(
    monitor: Arc<NewsMonitor>,
    schedule: Schedule,
    tick: Duration,
    run_on_start: bool,
    shutdown: Arc<Notify>,
) -> Result<()> {
    // Registered before any work so a shutdown during a check is not lost.
    let shutdown_signal = shutdown.notified();
    tokio::pin!(shutdown_signal);

    info!(?schedule, "worker: starting scheduler");

    if run_on_start {
        run_check(&monitor).await;
    }

    if schedule.is_empty() {
        warn!("worker: schedule has no jobs, waiting for shutdown");
        shutdown_signal.await;
        return Ok(());
    }

    let tick = tick.max(Duration::from_secs(1));
    let mut timetable = Timetable::new(schedule, Local::now());
    if let Some(next) = timetable.next_due() {
        info!("worker: next news check at {}", next.format("%Y-%m-%d %H:%M"));
    }

    loop {
        let now = Local::now();
        if timetable.take_due(&now) {
            run_check(&monitor).await;
            if let Some(next) = timetable.next_due() {
                info!("worker: next news check at {}", next.format("%Y-%m-%d %H:%M"));
            }
        }

        let wait = timetable
            .next_due()
            .map(|at| (at - Local::now()).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(tick)
            .min(tick);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown_signal => {
                info!("worker: shutdown requested, exiting loop");
                break;
            }
        }
    }

    info!("worker: cleanup complete");
    Ok(())
}
