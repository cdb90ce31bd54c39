//! Dispatch orchestration.
//!
//! One event becomes one [`DispatchReport`]:
//! 1. Look up the template for the event kind
//! 2. Director branch: render once with the city, fan out to every reachable director
//! 3. Master branch: render without the city, send to the assigned master
//! 4. Persist one history record per outcome
//!
//! The branches are independent. A failure in one never suppresses the other,
//! and history persistence errors are logged, never returned.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use courier_common::types::RecipientType;

use crate::channel::{MessageChannel, OutgoingMessage};
use crate::error::DispatchError;
use crate::event::{Event, RawEvent};
use crate::resolver::{Destination, RecipientResolver};
use crate::store::{DeliveryRecord, HistoryStore, RecipientStore};
use crate::templates::{RenderContext, Template, TemplateRegistry};

const OPEN_ORDER_BUTTON: &str = "📋 Открыть заказ";

/// Base URLs of the CRM frontends, one per audience.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub director_order_url: String,
    pub master_order_url: String,
}

impl LinkConfig {
    fn order_link(base: &str, order_id: i64) -> String {
        format!("{}/orders/{}", base.trim_end_matches('/'), order_id)
    }

    pub fn director_link(&self, order_id: i64) -> String {
        Self::order_link(&self.director_order_url, order_id)
    }

    pub fn master_link(&self, order_id: i64) -> String {
        Self::order_link(&self.master_order_url, order_id)
    }
}

/// Result of considering one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    /// `None` only for the synthetic outcome of an unknown event kind.
    pub recipient_type: Option<RecipientType>,
    pub recipient_id: Option<i64>,
    pub recipient_name: Option<String>,
    pub attempted: bool,
    /// The recipient was missing or had no address; nothing was sent.
    pub skipped: bool,
    pub success: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    fn skipped(recipient_type: RecipientType, id: i64, name: Option<String>, reason: &DispatchError) -> Self {
        Self {
            recipient_type: Some(recipient_type),
            recipient_id: Some(id),
            recipient_name: name,
            attempted: false,
            skipped: true,
            success: false,
            attempts: 0,
            error: Some(reason.to_string()),
        }
    }

    fn failed(recipient_type: Option<RecipientType>, error: &DispatchError) -> Self {
        Self {
            recipient_type,
            recipient_id: None,
            recipient_name: None,
            attempted: false,
            skipped: false,
            success: false,
            attempts: 0,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate state of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// At least one recipient received the message.
    Delivered,
    /// Someone should have received it, but every attempt failed.
    AllFailed,
    /// No eligible destination existed.
    NoRecipients,
    UnknownTemplate,
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStatus::Delivered => write!(f, "delivered"),
            DispatchStatus::AllFailed => write!(f, "all_failed"),
            DispatchStatus::NoRecipients => write!(f, "no_recipients"),
            DispatchStatus::UnknownTemplate => write!(f, "unknown_template"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub order_id: i64,
    pub success: bool,
    pub status: DispatchStatus,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    fn from_outcomes(kind: &str, order_id: i64, outcomes: Vec<DeliveryOutcome>) -> Self {
        let status = if outcomes.iter().any(|o| o.success) {
            DispatchStatus::Delivered
        } else if outcomes.iter().any(|o| !o.skipped) {
            DispatchStatus::AllFailed
        } else {
            DispatchStatus::NoRecipients
        };

        Self {
            kind: kind.to_string(),
            order_id,
            success: status == DispatchStatus::Delivered,
            status,
            outcomes,
        }
    }

    fn unknown_template(kind: String, order_id: i64, error: &DispatchError) -> Self {
        Self {
            kind,
            order_id,
            success: false,
            status: DispatchStatus::UnknownTemplate,
            outcomes: vec![DeliveryOutcome::failed(None, error)],
        }
    }

    /// Number of outcomes that reached their recipient.
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Whether any outcome involved a real send attempt.
    pub fn any_attempted(&self) -> bool {
        self.outcomes.iter().any(|o| o.attempted)
    }
}

/// Renders, routes and delivers order events.
pub struct Dispatcher {
    resolver: RecipientResolver,
    history: Arc<dyn HistoryStore>,
    channel: Arc<dyn MessageChannel>,
    links: LinkConfig,
    timezone: Tz,
}

impl Dispatcher {
    pub fn new(
        recipients: Arc<dyn RecipientStore>,
        history: Arc<dyn HistoryStore>,
        channel: Arc<dyn MessageChannel>,
        links: LinkConfig,
        timezone: Tz,
    ) -> Self {
        Self {
            resolver: RecipientResolver::new(recipients),
            history,
            channel,
            links,
            timezone,
        }
    }

    /// Dispatch a boundary payload. An unknown kind yields an
    /// `unknown_template` report instead of an error.
    pub async fn dispatch_raw(&self, raw: RawEvent) -> DispatchReport {
        let kind = raw.kind.clone();
        let order_id = raw.order_id;

        match Event::from_raw(raw) {
            Ok(event) => self.dispatch(&event).await,
            Err(err) => {
                tracing::warn!(kind = %kind, order_id, error = %err, "Rejected notification");
                DispatchReport::unknown_template(kind, order_id, &err)
            }
        }
    }

    pub async fn dispatch(&self, event: &Event) -> DispatchReport {
        let template = TemplateRegistry::template(event.kind());
        let mut outcomes = Vec::new();

        if template.policy.includes_directors() {
            match event.city.as_deref() {
                Some(city) => outcomes.extend(self.notify_directors(template, event, city).await),
                None => tracing::debug!(
                    kind = %template.kind,
                    order_id = event.order_id,
                    "No city on event, director branch skipped"
                ),
            }
        }

        if template.policy.includes_master() {
            match event.master_id {
                Some(master_id) => outcomes.push(self.notify_master(template, event, master_id).await),
                None => tracing::debug!(
                    kind = %template.kind,
                    order_id = event.order_id,
                    "No master on event, master branch skipped"
                ),
            }
        }

        self.persist(event, &outcomes).await;

        let report = DispatchReport::from_outcomes(template.kind.as_str(), event.order_id, outcomes);
        tracing::info!(
            kind = %report.kind,
            order_id = report.order_id,
            status = %report.status,
            delivered = report.delivered_count(),
            recipients = report.outcomes.len(),
            "Notification dispatched"
        );
        report
    }

    async fn notify_directors(&self, template: &Template, event: &Event, city: &str) -> Vec<DeliveryOutcome> {
        let destinations = match self.resolver.resolve_directors(city).await {
            Ok(destinations) => destinations,
            Err(err) => {
                tracing::error!(
                    order_id = event.order_id,
                    city,
                    error = %err,
                    "Failed to resolve directors"
                );
                return vec![DeliveryOutcome::failed(Some(RecipientType::Director), &err)];
            }
        };

        if destinations.is_empty() {
            tracing::warn!(order_id = event.order_id, city, "No directors found for city");
            return Vec::new();
        }

        let ctx = RenderContext {
            order_id: event.order_id,
            city: Some(city),
            timezone: self.timezone,
        };
        let message = OutgoingMessage::plain(template.render(&ctx, &event.details))
            .with_button(OPEN_ORDER_BUTTON, self.links.director_link(event.order_id));

        let mut outcomes: Vec<DeliveryOutcome> = join_all(
            destinations
                .reachable
                .iter()
                .map(|destination| self.deliver(destination, &message)),
        )
        .await;

        for director in destinations.unreachable {
            let reason = DispatchError::RecipientUnreachable {
                recipient_type: RecipientType::Director,
                id: director.id,
                name: director.name.clone(),
            };
            tracing::warn!(director_id = director.id, error = %reason, "Director skipped");
            outcomes.push(DeliveryOutcome::skipped(
                RecipientType::Director,
                director.id,
                Some(director.name),
                &reason,
            ));
        }

        outcomes
    }

    async fn notify_master(&self, template: &Template, event: &Event, master_id: i64) -> DeliveryOutcome {
        let destination = match self.resolver.resolve_master(master_id).await {
            Ok(destination) => destination,
            Err(err) if err.is_skip() => {
                tracing::warn!(master_id, order_id = event.order_id, error = %err, "Master skipped");
                let name = match &err {
                    DispatchError::RecipientUnreachable { name, .. } => Some(name.clone()),
                    _ => None,
                };
                return DeliveryOutcome::skipped(RecipientType::Master, master_id, name, &err);
            }
            Err(err) => {
                tracing::error!(master_id, order_id = event.order_id, error = %err, "Failed to resolve master");
                let mut outcome = DeliveryOutcome::failed(Some(RecipientType::Master), &err);
                outcome.recipient_id = Some(master_id);
                return outcome;
            }
        };

        let ctx = RenderContext {
            order_id: event.order_id,
            city: None,
            timezone: self.timezone,
        };
        let mut message = OutgoingMessage::plain(template.render(&ctx, &event.details));
        if template.master_link {
            message = message.with_button(OPEN_ORDER_BUTTON, self.links.master_link(event.order_id));
        }

        self.deliver(&destination, &message).await
    }

    async fn deliver(&self, destination: &Destination, message: &OutgoingMessage) -> DeliveryOutcome {
        let report = self.channel.send(&destination.channel_address, message).await;
        let error = report.error.map(|detail| {
            DispatchError::DeliveryFailed {
                attempts: report.attempts,
                detail,
            }
            .to_string()
        });

        DeliveryOutcome {
            recipient_type: Some(destination.recipient.recipient_type),
            recipient_id: Some(destination.recipient.id),
            recipient_name: Some(destination.recipient.name.clone()),
            attempted: report.attempts > 0,
            skipped: false,
            success: report.delivered,
            attempts: report.attempts,
            error,
        }
    }

    async fn persist(&self, event: &Event, outcomes: &[DeliveryOutcome]) {
        let now = Utc::now();
        for outcome in outcomes {
            let Some(recipient_type) = outcome.recipient_type else {
                continue;
            };
            let record = DeliveryRecord {
                id: Uuid::new_v4(),
                kind: event.kind(),
                order_id: event.order_id,
                recipient_type,
                recipient_id: outcome.recipient_id,
                success: outcome.success,
                attempts: outcome.attempts,
                error: outcome.error.clone(),
                created_at: now,
            };

            if let Err(e) = self.history.record_delivery(&record).await {
                let err = DispatchError::HistoryPersistence(e.to_string());
                tracing::error!(
                    order_id = event.order_id,
                    kind = %record.kind,
                    error = %err,
                    "Failed to record delivery"
                );
            }
        }
    }
}
