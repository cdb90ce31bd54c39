//! In-memory stores and a recording channel.
//!
//! Suitable for tests and local development only: no durability and no
//! cross-process coordination.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_common::error::AppError;
use courier_common::types::{DirectorRecord, MasterRecord, OrderDetails, OrderRecord};

use crate::channel::{MessageChannel, OutgoingMessage, SendReport};
use crate::store::{DeliveryRecord, HistoryStore, OrderStore, RecipientStore, ReminderKey};

/// Converts a lock poison error to a store error.
fn poison_err<T>(_: PoisonError<T>) -> AppError {
    AppError::Internal("lock poisoned".to_string())
}

/// Directors, masters and orders held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecords {
    directors: RwLock<Vec<DirectorRecord>>,
    masters: RwLock<HashMap<i64, MasterRecord>>,
    orders: RwLock<Vec<OrderRecord>>,
    details: RwLock<HashMap<i64, OrderDetails>>,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_director(&self, director: DirectorRecord) {
        self.directors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(director);
    }

    pub fn add_master(&self, master: MasterRecord) {
        self.masters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(master.id, master);
    }

    /// Insert or replace an order by id.
    pub fn upsert_order(&self, order: OrderRecord) {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        orders.retain(|o| o.id != order.id);
        orders.push(order);
        orders.sort_by_key(|o| o.id);
    }

    pub fn set_order_details(&self, details: OrderDetails) {
        self.details
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(details.id, details);
    }

    fn master_reachable(&self, master_id: Option<i64>) -> Result<bool, AppError> {
        let masters = self.masters.read().map_err(poison_err)?;
        Ok(master_id
            .and_then(|id| masters.get(&id))
            .and_then(|m| m.channel_address.as_deref())
            .is_some_and(|a| !a.trim().is_empty()))
    }
}

#[async_trait]
impl RecipientStore for InMemoryRecords {
    async fn find_directors_by_city(&self, city: &str) -> Result<Vec<DirectorRecord>, AppError> {
        let directors = self.directors.read().map_err(poison_err)?;
        Ok(directors
            .iter()
            .filter(|d| d.cities.iter().any(|c| c == city))
            .cloned()
            .collect())
    }

    async fn find_master_by_id(&self, id: i64) -> Result<Option<MasterRecord>, AppError> {
        let masters = self.masters.read().map_err(poison_err)?;
        Ok(masters.get(&id).cloned())
    }
}

#[async_trait]
impl OrderStore for InMemoryRecords {
    async fn find_orders_pending_closure(
        &self,
        statuses: &[&str],
        meeting_before: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, AppError> {
        let candidates: Vec<OrderRecord> = {
            let orders = self.orders.read().map_err(poison_err)?;
            orders
                .iter()
                .filter(|o| statuses.contains(&o.status.as_str()))
                .filter(|o| o.date_meeting.is_some_and(|m| m <= meeting_before))
                .cloned()
                .collect()
        };

        let mut result = Vec::with_capacity(candidates.len());
        for order in candidates {
            if self.master_reachable(order.master_id)? {
                result.push(order);
            }
        }
        Ok(result)
    }

    async fn find_orders_in_status(&self, status: &str) -> Result<Vec<OrderRecord>, AppError> {
        let candidates: Vec<OrderRecord> = {
            let orders = self.orders.read().map_err(poison_err)?;
            orders.iter().filter(|o| o.status == status).cloned().collect()
        };

        let mut result = Vec::with_capacity(candidates.len());
        for order in candidates {
            if self.master_reachable(order.master_id)? {
                result.push(order);
            }
        }
        Ok(result)
    }

    async fn find_order_details(&self, id: i64) -> Result<Option<OrderDetails>, AppError> {
        let details = self.details.read().map_err(poison_err)?;
        Ok(details.get(&id).cloned())
    }
}

/// Delivery log and watermarks held in memory.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    deliveries: RwLock<Vec<DeliveryRecord>>,
    watermarks: RwLock<HashMap<ReminderKey, DateTime<Utc>>>,
    reject_deliveries: AtomicBool,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `record_delivery` call fail, to exercise error isolation.
    pub fn reject_deliveries(&self, reject: bool) {
        self.reject_deliveries.store(reject, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn watermark(&self, key: &ReminderKey) -> Option<DateTime<Utc>> {
        self.watermarks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn record_delivery(&self, record: &DeliveryRecord) -> Result<(), AppError> {
        if self.reject_deliveries.load(Ordering::SeqCst) {
            return Err(AppError::Internal("history store unavailable".to_string()));
        }
        self.deliveries
            .write()
            .map_err(poison_err)?
            .push(record.clone());
        Ok(())
    }

    async fn last_reminder_sent_at(
        &self,
        key: &ReminderKey,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self.watermarks.read().map_err(poison_err)?.get(key).copied())
    }

    async fn record_reminder_sent(
        &self,
        key: &ReminderKey,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.watermarks
            .write()
            .map_err(poison_err)?
            .insert(key.clone(), at);
        Ok(())
    }
}

/// A message captured by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub address: String,
    pub message: OutgoingMessage,
}

/// Channel that records messages instead of sending them.
///
/// Addresses marked with [`RecordingChannel::fail_address`] fail on every
/// attempt; nothing is recorded for them.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_address(&self, address: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.into());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|s| s.address == address)
            .map(|s| s.message)
            .collect()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send(&self, address: &str, message: &OutgoingMessage) -> SendReport {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address);
        if failing {
            return SendReport {
                delivered: false,
                attempts: 1,
                error: Some(format!("HTTP 400: chat {} not found", address)),
            };
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMessage {
                address: address.to_string(),
                message: message.clone(),
            });
        SendReport {
            delivered: true,
            attempts: 1,
            error: None,
        }
    }
}
