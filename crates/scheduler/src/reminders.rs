//! Close-order and modern-closing reminder passes.
//!
//! Each pass:
//! 1. Queries candidate orders from the order store
//! 2. For each order: claim the reminder key, read its watermark, decide
//! 3. Dispatches a synthesized reminder event when due
//! 4. Advances the watermark only if a send was actually attempted
//!
//! A failure on one order is logged and the pass moves on to the next.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use courier_common::config::ReminderConfig;
use courier_common::types::{MODERN_STATUS, OrderRecord, PENDING_CLOSURE_STATUSES};
use courier_notifier::event::{CloseOrderReminder, ModernClosingReminder, OrderCard};
use courier_notifier::store::{HistoryStore, OrderStore, ReminderKey};
use courier_notifier::{DispatchStatus, Dispatcher, Event, EventDetails, EventKind};

use crate::lock::ReminderClaims;

/// Tolerance on cadence checks for timer-driven passes, so an hourly tick
/// that lands a few minutes short of the interval still counts. On-demand
/// passes use no slack and never fire before the configured interval.
const CADENCE_SLACK_MINUTES: i64 = 5;

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub scanned: usize,
    pub sent: usize,
    pub not_due: usize,
    /// Claimed elsewhere, or nobody could be reached.
    pub skipped: usize,
    pub failed: usize,
}

enum Step {
    Sent,
    NotDue,
    Skipped,
    Failed,
}

impl PassSummary {
    fn record(&mut self, key: &ReminderKey, step: anyhow::Result<Step>) {
        match step {
            Ok(Step::Sent) => self.sent += 1,
            Ok(Step::NotDue) => self.not_due += 1,
            Ok(Step::Skipped) => self.skipped += 1,
            Ok(Step::Failed) => self.failed += 1,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Reminder processing failed");
                self.failed += 1;
            }
        }
    }
}

/// Whether a close-order reminder is due; returns whole days since the meeting.
///
/// The first reminder waits `first_reminder_hours` after the meeting, later
/// ones `reminder_interval_hours` after the previous send. Both thresholds
/// are shortened by `slack`.
pub fn close_order_due(
    meeting: DateTime<Utc>,
    last_sent: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &ReminderConfig,
    slack: Duration,
) -> Option<i64> {
    let since_meeting = now - meeting;

    if since_meeting + slack < Duration::hours(config.first_reminder_hours) {
        return None;
    }
    if let Some(last) = last_sent {
        if now - last + slack < Duration::hours(config.reminder_interval_hours) {
            return None;
        }
    }

    Some(since_meeting.num_hours().max(0) / 24)
}

/// Whether a modern-closing reminder is due; returns days until closing
/// (negative when overdue, 0 on the day or when the order has no date).
///
/// At most one reminder per local calendar day.
pub fn modern_closing_due(
    order: &OrderRecord,
    last_sent: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &ReminderConfig,
) -> Option<i64> {
    let tz = config.timezone;
    let today = now.with_timezone(&tz).date_naive();

    if last_sent.is_some_and(|at| at.with_timezone(&tz).date_naive() == today) {
        return None;
    }

    match order.expected_closing_date {
        Some(closing) => {
            let past = (today - closing.with_timezone(&tz).date_naive()).num_days();
            (past >= 0).then_some(-past)
        }
        None => {
            let idle = (today - order.updated_at.with_timezone(&tz).date_naive()).num_days();
            (idle >= config.modern_reminder_days).then_some(0)
        }
    }
}

fn order_card(order: &OrderRecord) -> OrderCard {
    OrderCard {
        rk: order.rk.clone(),
        avito_name: order.avito_name.clone(),
        type_equipment: order.type_equipment.clone(),
    }
}

fn close_order_event(order: &OrderRecord, master_id: i64, days_overdue: i64) -> Event {
    let details = EventDetails::CloseOrderReminder(CloseOrderReminder {
        card: order_card(order),
        client_name: order.client_name.clone(),
        date_meeting: order.date_meeting.map(|t| t.to_rfc3339()),
        days_overdue,
    });
    Event::new(order.id, details).with_master(Some(master_id))
}

fn modern_closing_event(order: &OrderRecord, master_id: i64, days_until_closing: i64) -> Event {
    let details = EventDetails::ModernClosingReminder(ModernClosingReminder {
        card: order_card(order),
        client_name: order.client_name.clone(),
        date_meeting: order.date_meeting.map(|t| t.to_rfc3339()),
        expected_closing_date: order.expected_closing_date.map(|t| t.to_rfc3339()),
        days_until_closing,
    });
    Event::new(order.id, details).with_master(Some(master_id))
}

/// Runs the reminder passes against the order store.
pub struct ReminderScheduler {
    orders: Arc<dyn OrderStore>,
    history: Arc<dyn HistoryStore>,
    dispatcher: Arc<Dispatcher>,
    claims: Arc<dyn ReminderClaims>,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        history: Arc<dyn HistoryStore>,
        dispatcher: Arc<Dispatcher>,
        claims: Arc<dyn ReminderClaims>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            orders,
            history,
            dispatcher,
            claims,
            config,
        }
    }

    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    /// On-demand close-order pass; cadence thresholds apply exactly.
    pub async fn run_close_order_pass(&self) -> anyhow::Result<PassSummary> {
        self.run_close_order_pass_at(Utc::now()).await
    }

    pub async fn run_close_order_pass_at(&self, now: DateTime<Utc>) -> anyhow::Result<PassSummary> {
        self.close_order_pass(now, Duration::zero()).await
    }

    /// Close-order pass for the hourly timer, with cadence slack.
    pub async fn run_scheduled_close_order_pass_at(
        &self,
        now: DateTime<Utc>,
    ) -> anyhow::Result<PassSummary> {
        self.close_order_pass(now, Duration::minutes(CADENCE_SLACK_MINUTES))
            .await
    }

    async fn close_order_pass(
        &self,
        now: DateTime<Utc>,
        slack: Duration,
    ) -> anyhow::Result<PassSummary> {
        let cutoff = now - Duration::hours(self.config.first_reminder_hours) + slack;
        let orders = self
            .orders
            .find_orders_pending_closure(&PENDING_CLOSURE_STATUSES, cutoff)
            .await?;

        let mut summary = PassSummary {
            scanned: orders.len(),
            ..Default::default()
        };

        for order in &orders {
            let (Some(master_id), Some(meeting)) = (order.master_id, order.date_meeting) else {
                summary.skipped += 1;
                continue;
            };
            let key = ReminderKey::new(EventKind::CloseOrderReminder, order.id, master_id);
            let step = self
                .process(&key, now, |last_sent| {
                    close_order_due(meeting, last_sent, now, &self.config, slack)
                        .map(|days| close_order_event(order, master_id, days))
                })
                .await;
            summary.record(&key, step);
        }

        tracing::info!(
            scanned = summary.scanned,
            sent = summary.sent,
            not_due = summary.not_due,
            skipped = summary.skipped,
            failed = summary.failed,
            "Close-order reminder pass finished"
        );
        Ok(summary)
    }

    pub async fn run_modern_closing_pass(&self) -> anyhow::Result<PassSummary> {
        self.run_modern_closing_pass_at(Utc::now()).await
    }

    pub async fn run_modern_closing_pass_at(&self, now: DateTime<Utc>) -> anyhow::Result<PassSummary> {
        let orders = self.orders.find_orders_in_status(MODERN_STATUS).await?;

        let mut summary = PassSummary {
            scanned: orders.len(),
            ..Default::default()
        };

        for order in &orders {
            let Some(master_id) = order.master_id else {
                summary.skipped += 1;
                continue;
            };
            let key = ReminderKey::new(EventKind::ModernClosingReminder, order.id, master_id);
            let step = self
                .process(&key, now, |last_sent| {
                    modern_closing_due(order, last_sent, now, &self.config)
                        .map(|days| modern_closing_event(order, master_id, days))
                })
                .await;
            summary.record(&key, step);
        }

        tracing::info!(
            scanned = summary.scanned,
            sent = summary.sent,
            not_due = summary.not_due,
            skipped = summary.skipped,
            failed = summary.failed,
            "Modern-closing reminder pass finished"
        );
        Ok(summary)
    }

    /// Claim, decide and send for one reminder key. The claim is always
    /// released, even when processing fails.
    async fn process<F>(&self, key: &ReminderKey, now: DateTime<Utc>, build: F) -> anyhow::Result<Step>
    where
        F: FnOnce(Option<DateTime<Utc>>) -> Option<Event>,
    {
        if !self.claims.try_claim(key).await? {
            return Ok(Step::Skipped);
        }

        let result = self.process_claimed(key, now, build).await;

        if let Err(e) = self.claims.release(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to release reminder claim");
        }
        result
    }

    async fn process_claimed<F>(&self, key: &ReminderKey, now: DateTime<Utc>, build: F) -> anyhow::Result<Step>
    where
        F: FnOnce(Option<DateTime<Utc>>) -> Option<Event>,
    {
        let last_sent = self.history.last_reminder_sent_at(key).await?;
        let Some(event) = build(last_sent) else {
            return Ok(Step::NotDue);
        };

        let report = self.dispatcher.dispatch(&event).await;
        if report.any_attempted() {
            self.history.record_reminder_sent(key, now).await?;
        }

        Ok(match report.status {
            DispatchStatus::Delivered => Step::Sent,
            DispatchStatus::NoRecipients => Step::Skipped,
            DispatchStatus::AllFailed | DispatchStatus::UnknownTemplate => Step::Failed,
        })
    }
}
