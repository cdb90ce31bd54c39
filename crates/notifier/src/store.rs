//! Collaborator interfaces for records and delivery history.
//!
//! Orders, directors and masters are owned by other services; the notifier
//! only reads them. History (delivery log and reminder watermarks) is
//! written here but may live in any backing store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{DirectorRecord, MasterRecord, OrderDetails, OrderRecord, RecipientType};

use crate::event::EventKind;

/// Lookup of notification recipients.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// All directors serving `city`, reachable or not.
    async fn find_directors_by_city(&self, city: &str) -> Result<Vec<DirectorRecord>, AppError>;

    async fn find_master_by_id(&self, id: i64) -> Result<Option<MasterRecord>, AppError>;
}

/// Read access to orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders in one of `statuses`, with a master assigned and reachable,
    /// whose meeting time is at or before `meeting_before`.
    async fn find_orders_pending_closure(
        &self,
        statuses: &[&str],
        meeting_before: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, AppError>;

    /// Orders in `status` with a master assigned and reachable.
    async fn find_orders_in_status(&self, status: &str) -> Result<Vec<OrderRecord>, AppError>;

    async fn find_order_details(&self, id: i64) -> Result<Option<OrderDetails>, AppError>;
}

/// Identity of a reminder stream: one kind, one order, one master.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    pub kind: EventKind,
    pub order_id: i64,
    pub master_id: i64,
}

impl ReminderKey {
    pub fn new(kind: EventKind, order_id: i64, master_id: i64) -> Self {
        Self {
            kind,
            order_id,
            master_id,
        }
    }
}

impl std::fmt::Display for ReminderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.order_id, self.master_id)
    }
}

/// One persisted delivery outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub kind: EventKind,
    pub order_id: i64,
    pub recipient_type: RecipientType,
    pub recipient_id: Option<i64>,
    pub success: bool,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Delivery audit log and reminder watermarks.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_delivery(&self, record: &DeliveryRecord) -> Result<(), AppError>;

    async fn last_reminder_sent_at(
        &self,
        key: &ReminderKey,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    async fn record_reminder_sent(
        &self,
        key: &ReminderKey,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}
