//! Timer loop driving the reminder passes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Days, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::reminders::{PassSummary, ReminderScheduler};

const CLOSE_ORDER_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Wall-clock source for the runner.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The two timer-driven passes.
#[async_trait]
pub trait ReminderPasses: Send + Sync {
    async fn close_orders(&self, now: DateTime<Utc>) -> anyhow::Result<PassSummary>;

    async fn modern_closings(&self, now: DateTime<Utc>) -> anyhow::Result<PassSummary>;
}

#[async_trait]
impl ReminderPasses for ReminderScheduler {
    async fn close_orders(&self, now: DateTime<Utc>) -> anyhow::Result<PassSummary> {
        self.run_scheduled_close_order_pass_at(now).await
    }

    async fn modern_closings(&self, now: DateTime<Utc>) -> anyhow::Result<PassSummary> {
        self.run_modern_closing_pass_at(now).await
    }
}

/// Next instant strictly after `now` at which the local clock in `tz` reads `hour:00`.
///
/// On a day where that local time does not exist (DST gap) the following day is used.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();

    for offset in 0..3 {
        let Some(naive) = (today + Days::new(offset)).and_hms_opt(hour, 0, 0) else {
            break;
        };
        if let Some(local) = tz.from_local_datetime(&naive).earliest() {
            let candidate = local.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
    }

    now + chrono::Duration::days(1)
}

/// Runs the close-order pass hourly and the modern-closing pass once a day.
///
/// The daily deadline is fixed until its pass has run, so a close-order
/// pass still running at the modern hour delays that day's modern pass
/// instead of dropping it.
pub struct ReminderRunner {
    passes: Arc<dyn ReminderPasses>,
    modern_hour: u32,
    timezone: Tz,
    clock: Clock,
}

impl ReminderRunner {
    pub fn new(scheduler: Arc<ReminderScheduler>) -> Self {
        let modern_hour = scheduler.config().modern_reminder_hour;
        let timezone = scheduler.config().timezone;
        Self::with_passes(scheduler, modern_hour, timezone)
    }

    pub fn with_passes(passes: Arc<dyn ReminderPasses>, modern_hour: u32, timezone: Tz) -> Self {
        Self {
            passes,
            modern_hour,
            timezone,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Timer instant at which the wall clock reaches `at`.
    fn deadline(&self, at: DateTime<Utc>) -> Instant {
        Instant::now() + (at - self.now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut hourly = tokio::time::interval(CLOSE_ORDER_INTERVAL);
        hourly.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut next_modern = next_daily_run(self.now(), self.modern_hour, self.timezone);
        let modern = tokio::time::sleep_until(self.deadline(next_modern));
        tokio::pin!(modern);

        tracing::info!(
            modern_hour = self.modern_hour,
            timezone = %self.timezone,
            next_modern = %next_modern,
            "Reminder runner started"
        );

        loop {
            tokio::select! {
                _ = hourly.tick() => {
                    if let Err(e) = self.passes.close_orders(self.now()).await {
                        tracing::error!(error = %e, "Close-order reminder pass failed");
                    }
                }
                _ = &mut modern => {
                    if let Err(e) = self.passes.modern_closings(self.now()).await {
                        tracing::error!(error = %e, "Modern-closing reminder pass failed");
                    }
                    next_modern = next_daily_run(
                        self.now().max(next_modern),
                        self.modern_hour,
                        self.timezone,
                    );
                    modern.as_mut().reset(self.deadline(next_modern));
                    tracing::debug!(next_modern = %next_modern, "Next modern-closing pass scheduled");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Reminder runner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        // 05:00 UTC is 08:00 in Moscow; 10:00 Moscow is 07:00 UTC.
        let next = next_daily_run(at(2025, 6, 10, 5, 0), 10, chrono_tz::Europe::Moscow);
        assert_eq!(next, at(2025, 6, 10, 7, 0));
    }

    #[test]
    fn test_next_run_tomorrow_when_hour_passed() {
        let next = next_daily_run(at(2025, 6, 10, 7, 0), 10, chrono_tz::Europe::Moscow);
        assert_eq!(next, at(2025, 6, 11, 7, 0));
    }

    #[test]
    fn test_next_run_across_local_midnight() {
        // 22:00 UTC on the 10th is already 01:00 on the 11th in Moscow.
        let next = next_daily_run(at(2025, 6, 10, 22, 0), 10, chrono_tz::Europe::Moscow);
        assert_eq!(next, at(2025, 6, 11, 7, 0));
    }

    /// Records the clock reading of every pass; close-order passes take `close_takes`.
    struct RecordingPasses {
        close_takes: Duration,
        close: Mutex<Vec<DateTime<Utc>>>,
        modern: Mutex<Vec<DateTime<Utc>>>,
    }

    #[async_trait]
    impl ReminderPasses for RecordingPasses {
        async fn close_orders(&self, now: DateTime<Utc>) -> anyhow::Result<PassSummary> {
            self.close.lock().unwrap().push(now);
            tokio::time::sleep(self.close_takes).await;
            Ok(PassSummary::default())
        }

        async fn modern_closings(&self, now: DateTime<Utc>) -> anyhow::Result<PassSummary> {
            self.modern.lock().unwrap().push(now);
            Ok(PassSummary::default())
        }
    }

    /// Wall clock that follows tokio's (paused) timer from `base`.
    fn virtual_clock(base: DateTime<Utc>) -> Clock {
        let start = Instant::now();
        Arc::new(move || base + chrono::Duration::from_std(Instant::now() - start).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_modern_pass_runs_when_close_pass_overlaps_its_hour() {
        let tz = chrono_tz::Europe::Moscow;
        let passes = Arc::new(RecordingPasses {
            close_takes: Duration::from_secs(30),
            close: Mutex::new(Vec::new()),
            modern: Mutex::new(Vec::new()),
        });
        // 09:59:50 in Moscow: the startup close-order pass runs past 10:00.
        let base = at(2025, 6, 10, 6, 59) + chrono::Duration::seconds(50);
        let runner = ReminderRunner::with_passes(passes.clone(), 10, tz)
            .with_clock(virtual_clock(base));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runner.run(rx));

        tokio::time::sleep(Duration::from_secs(25 * 60 * 60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let modern = passes.modern.lock().unwrap().clone();
        let days: Vec<_> = modern
            .iter()
            .map(|t| t.with_timezone(&tz).date_naive())
            .collect();
        assert_eq!(
            days,
            vec![
                at(2025, 6, 10, 0, 0).date_naive(),
                at(2025, 6, 11, 0, 0).date_naive(),
            ]
        );
        // Delayed only by the overlapping close-order pass.
        assert!(modern[0] >= at(2025, 6, 10, 7, 0));
        assert!(modern[0] < at(2025, 6, 10, 7, 1));

        assert!(passes.close.lock().unwrap().len() >= 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown_signal() {
        let passes = Arc::new(RecordingPasses {
            close_takes: Duration::ZERO,
            close: Mutex::new(Vec::new()),
            modern: Mutex::new(Vec::new()),
        });
        let runner = ReminderRunner::with_passes(passes.clone(), 10, chrono_tz::Europe::Moscow)
            .with_clock(virtual_clock(at(2025, 6, 10, 12, 0)));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runner.run(rx));
        tokio::time::sleep(Duration::from_secs(90 * 60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(passes.close.lock().unwrap().len(), 2);
        assert!(passes.modern.lock().unwrap().is_empty());
    }
}
