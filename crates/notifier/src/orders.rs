//! Typed notification helpers behind the webhook endpoints.
//!
//! Callers often send partial payloads. Missing fields are filled from the
//! order record; a failed lookup is logged and the notification goes out
//! with whatever the caller provided.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use courier_common::types::OrderDetails;

use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::event::{
    CloseOrderReminder, DateChange, Event, EventDetails, MasterAssigned, ModernClosingReminder,
    NewOrder, OrderAccepted, OrderCard, OrderClosed, OrderInModern, OrderRejection,
    deserialize_text,
};
use crate::store::OrderStore;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderRequest {
    pub order_id: i64,
    pub city: Option<String>,
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_meeting: Option<String>,
    pub problem: Option<String>,
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateChangeRequest {
    pub order_id: i64,
    pub city: Option<String>,
    pub master_id: Option<i64>,
    pub client_name: Option<String>,
    pub new_date: Option<String>,
    pub old_date: Option<String>,
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRejectionRequest {
    pub order_id: i64,
    pub city: Option<String>,
    pub master_id: Option<i64>,
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub phone: Option<String>,
    pub reason: Option<String>,
    pub date_meeting: Option<String>,
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterAssignedRequest {
    pub order_id: i64,
    pub master_id: i64,
    pub client_name: Option<String>,
    pub address: Option<String>,
    pub date_meeting: Option<String>,
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterReassignedRequest {
    pub order_id: i64,
    /// The master who lost the order; the new one gets `master_assigned`.
    pub old_master_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAcceptedRequest {
    pub order_id: i64,
    pub master_id: i64,
    pub client_name: Option<String>,
    pub date_meeting: Option<String>,
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderClosedRequest {
    pub order_id: i64,
    pub master_id: i64,
    pub client_name: Option<String>,
    pub closing_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub total: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub expense: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub net: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub handover: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInModernRequest {
    pub order_id: i64,
    pub master_id: i64,
    pub client_name: Option<String>,
    pub date_meeting: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub prepayment: Option<String>,
    pub expected_closing_date: Option<String>,
    pub comment: Option<String>,
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOrderReminderRequest {
    pub order_id: i64,
    pub master_id: i64,
    pub client_name: Option<String>,
    pub days_overdue: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModernClosingReminderRequest {
    pub order_id: i64,
    pub master_id: i64,
    pub client_name: Option<String>,
    pub expected_closing_date: Option<String>,
    pub days_until_closing: Option<i64>,
}

/// Builds typed events from webhook requests and dispatches them.
pub struct OrderNotifications {
    dispatcher: Arc<Dispatcher>,
    orders: Arc<dyn OrderStore>,
}

impl OrderNotifications {
    pub fn new(dispatcher: Arc<Dispatcher>, orders: Arc<dyn OrderStore>) -> Self {
        Self { dispatcher, orders }
    }

    pub async fn new_order(&self, req: NewOrderRequest) -> DispatchReport {
        let needed = any_missing(&[
            &req.city,
            &req.client_name,
            &req.phone,
            &req.address,
            &req.date_meeting,
            &req.rk,
            &req.avito_name,
            &req.type_equipment,
        ]);
        let stored = self.stored(req.order_id, needed).await;
        let details = EventDetails::NewOrder(NewOrder {
            card: card(req.rk, req.avito_name, req.type_equipment, &stored),
            client_name: pick(req.client_name, stored.client_name.clone()),
            phone: pick(req.phone, stored.phone.clone()),
            address: pick(req.address, stored.address.clone()),
            date_meeting: pick(req.date_meeting, stamp(stored.date_meeting)),
            problem: present(req.problem),
        });
        let event = Event::new(req.order_id, details).with_city(pick(req.city, stored.city));
        self.dispatcher.dispatch(&event).await
    }

    pub async fn date_change(&self, req: DateChangeRequest) -> DispatchReport {
        let needed = any_missing(&[
            &req.city,
            &req.client_name,
            &req.rk,
            &req.avito_name,
            &req.type_equipment,
        ]);
        let stored = self.stored(req.order_id, needed).await;
        let details = EventDetails::DateChange(DateChange {
            card: card(req.rk, req.avito_name, req.type_equipment, &stored),
            client_name: pick(req.client_name, stored.client_name.clone()),
            new_date: present(req.new_date),
            old_date: present(req.old_date),
        });
        let event = Event::new(req.order_id, details)
            .with_city(pick(req.city, stored.city))
            .with_master(req.master_id);
        self.dispatcher.dispatch(&event).await
    }

    pub async fn order_rejection(&self, req: OrderRejectionRequest) -> DispatchReport {
        let needed = any_missing(&[
            &req.city,
            &req.client_name,
            &req.phone,
            &req.date_meeting,
            &req.rk,
            &req.avito_name,
            &req.type_equipment,
        ]);
        let stored = self.stored(req.order_id, needed).await;
        let details = EventDetails::OrderRejection(OrderRejection {
            card: card(req.rk, req.avito_name, req.type_equipment, &stored),
            client_name: pick(req.client_name, stored.client_name.clone()),
            phone: pick(req.phone, stored.phone.clone()),
            date_meeting: pick(req.date_meeting, stamp(stored.date_meeting)),
            reason: present(req.reason),
        });
        let event = Event::new(req.order_id, details)
            .with_city(pick(req.city, stored.city))
            .with_master(req.master_id);
        self.dispatcher.dispatch(&event).await
    }

    pub async fn master_assigned(&self, req: MasterAssignedRequest) -> DispatchReport {
        let needed = any_missing(&[
            &req.client_name,
            &req.address,
            &req.date_meeting,
            &req.rk,
            &req.avito_name,
            &req.type_equipment,
        ]);
        let stored = self.stored(req.order_id, needed).await;
        let details = EventDetails::MasterAssigned(MasterAssigned {
            card: card(req.rk, req.avito_name, req.type_equipment, &stored),
            client_name: pick(req.client_name, stored.client_name.clone()),
            address: pick(req.address, stored.address.clone()),
            date_meeting: pick(req.date_meeting, stamp(stored.date_meeting)),
        });
        let event = Event::new(req.order_id, details).with_master(Some(req.master_id));
        self.dispatcher.dispatch(&event).await
    }

    pub async fn master_reassigned(&self, req: MasterReassignedRequest) -> DispatchReport {
        let event = Event::new(req.order_id, EventDetails::MasterReassigned)
            .with_master(Some(req.old_master_id));
        self.dispatcher.dispatch(&event).await
    }

    /// Phone and address are rarely in the payload, so the record is always read.
    pub async fn order_accepted(&self, req: OrderAcceptedRequest) -> DispatchReport {
        let stored = self.stored(req.order_id, true).await;
        let details = EventDetails::OrderAccepted(OrderAccepted {
            card: card(req.rk, req.avito_name, req.type_equipment, &stored),
            client_name: pick(req.client_name, stored.client_name.clone()),
            phone: present(stored.phone.clone()),
            address: present(stored.address.clone()),
            date_meeting: pick(req.date_meeting, stamp(stored.date_meeting)),
        });
        let event = Event::new(req.order_id, details).with_master(Some(req.master_id));
        self.dispatcher.dispatch(&event).await
    }

    pub async fn order_closed(&self, req: OrderClosedRequest) -> DispatchReport {
        let needed = any_missing(&[
            &req.client_name,
            &req.closing_date,
            &req.total,
            &req.expense,
            &req.net,
            &req.handover,
        ]);
        let stored = self.stored(req.order_id, needed).await;
        let closing_date = pick(req.closing_date, stamp(stored.closing_date))
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let details = EventDetails::OrderClosed(OrderClosed {
            client_name: pick(req.client_name, stored.client_name),
            closing_date: Some(closing_date),
            total: pick(req.total, stored.total),
            expense: pick(req.expense, stored.expense),
            net: pick(req.net, stored.net),
            handover: pick(req.handover, stored.handover),
        });
        let event = Event::new(req.order_id, details).with_master(Some(req.master_id));
        self.dispatcher.dispatch(&event).await
    }

    pub async fn order_in_modern(&self, req: OrderInModernRequest) -> DispatchReport {
        let needed = any_missing(&[
            &req.client_name,
            &req.date_meeting,
            &req.expected_closing_date,
            &req.rk,
            &req.avito_name,
            &req.type_equipment,
        ]);
        let stored = self.stored(req.order_id, needed).await;
        let details = EventDetails::OrderInModern(OrderInModern {
            card: card(req.rk, req.avito_name, req.type_equipment, &stored),
            client_name: pick(req.client_name, stored.client_name.clone()),
            date_meeting: pick(req.date_meeting, stamp(stored.date_meeting)),
            prepayment: present(req.prepayment),
            expected_closing_date: pick(
                req.expected_closing_date,
                stamp(stored.expected_closing_date),
            ),
            comment: present(req.comment),
        });
        let event = Event::new(req.order_id, details).with_master(Some(req.master_id));
        self.dispatcher.dispatch(&event).await
    }

    pub async fn close_order_reminder(&self, req: CloseOrderReminderRequest) -> DispatchReport {
        let stored = self.stored(req.order_id, true).await;
        let details = EventDetails::CloseOrderReminder(CloseOrderReminder {
            card: card(None, None, None, &stored),
            client_name: pick(req.client_name, stored.client_name.clone()),
            date_meeting: stamp(stored.date_meeting),
            days_overdue: req.days_overdue.unwrap_or(0),
        });
        let event = Event::new(req.order_id, details).with_master(Some(req.master_id));
        self.dispatcher.dispatch(&event).await
    }

    pub async fn modern_closing_reminder(&self, req: ModernClosingReminderRequest) -> DispatchReport {
        let stored = self.stored(req.order_id, true).await;
        let details = EventDetails::ModernClosingReminder(ModernClosingReminder {
            card: card(None, None, None, &stored),
            client_name: pick(req.client_name, stored.client_name.clone()),
            date_meeting: stamp(stored.date_meeting),
            expected_closing_date: pick(
                req.expected_closing_date,
                stamp(stored.expected_closing_date),
            ),
            days_until_closing: req.days_until_closing.unwrap_or(0),
        });
        let event = Event::new(req.order_id, details).with_master(Some(req.master_id));
        self.dispatcher.dispatch(&event).await
    }

    /// Order record used for enrichment; empty when not needed or unavailable.
    async fn stored(&self, order_id: i64, needed: bool) -> OrderDetails {
        if !needed {
            return OrderDetails::default();
        }
        match self.orders.find_order_details(order_id).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                tracing::warn!(order_id, "Order not found, sending with caller data only");
                OrderDetails::default()
            }
            Err(e) => {
                tracing::error!(order_id, error = %e, "Failed to fetch order data");
                OrderDetails::default()
            }
        }
    }
}

/// Whether any field the order record could supply is absent or blank.
fn any_missing(fields: &[&Option<String>]) -> bool {
    fields
        .iter()
        .any(|f| f.as_deref().is_none_or(|v| v.trim().is_empty()))
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Caller value if given, else the stored one.
fn pick(given: Option<String>, stored: Option<String>) -> Option<String> {
    present(given).or_else(|| present(stored))
}

fn stamp(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339())
}

fn card(
    rk: Option<String>,
    avito_name: Option<String>,
    type_equipment: Option<String>,
    stored: &OrderDetails,
) -> OrderCard {
    OrderCard {
        rk: pick(rk, stored.rk.clone()),
        avito_name: pick(avito_name, stored.avito_name.clone()),
        type_equipment: pick(type_equipment, stored.type_equipment.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_common::types::{DirectorRecord, MasterRecord};

    use crate::dispatcher::{DispatchStatus, LinkConfig};
    use crate::memory::{InMemoryHistory, InMemoryRecords, RecordingChannel};

    struct Harness {
        channel: Arc<RecordingChannel>,
        notifications: OrderNotifications,
    }

    fn harness() -> Harness {
        let records = Arc::new(InMemoryRecords::new());
        let channel = Arc::new(RecordingChannel::new());
        let dispatcher = Arc::new(Dispatcher::new(
            records.clone(),
            Arc::new(InMemoryHistory::new()),
            channel.clone(),
            LinkConfig {
                director_order_url: "https://new.lead-schem.ru".into(),
                master_order_url: "https://lead-schem.ru".into(),
            },
            chrono_tz::Europe::Moscow,
        ));
        records.add_master(MasterRecord {
            id: 7,
            name: "Пётр".into(),
            channel_address: Some("777".into()),
        });
        records.add_master(MasterRecord {
            id: 8,
            name: "Олег".into(),
            channel_address: Some("888".into()),
        });
        records.add_director(DirectorRecord {
            id: 1,
            name: "Анна".into(),
            cities: vec!["Саратов".into()],
            channel_address: Some("111".into()),
        });
        records.set_order_details(OrderDetails {
            id: 50,
            client_name: Some("Сергей".into()),
            phone: Some("+79990001122".into()),
            address: Some("ул. Ленина, 1".into()),
            city: Some("Саратов".into()),
            rk: Some("Авито".into()),
            type_equipment: Some("Холодильники".into()),
            date_meeting: Some(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
            total: Some("5000".into()),
            ..Default::default()
        });
        Harness {
            notifications: OrderNotifications::new(dispatcher, records),
            channel,
        }
    }

    #[tokio::test]
    async fn test_order_accepted_reads_phone_and_address_from_record() {
        let h = harness();
        let report = h
            .notifications
            .order_accepted(OrderAcceptedRequest {
                order_id: 50,
                master_id: 7,
                ..Default::default()
            })
            .await;

        assert_eq!(report.status, DispatchStatus::Delivered);
        let sent = h.channel.sent_to("777");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("📞 Телефон: +79990001122"));
        assert!(sent[0].text.contains("📍 Адрес: ул. Ленина, 1"));
        assert!(sent[0].text.contains("🗓 Дата встречи: 01.06.2025, 12:00"));
    }

    #[tokio::test]
    async fn test_caller_values_take_precedence() {
        let h = harness();
        h.notifications
            .order_closed(OrderClosedRequest {
                order_id: 50,
                master_id: 7,
                client_name: Some("Игорь".into()),
                total: Some("7000".into()),
                ..Default::default()
            })
            .await;

        let text = &h.channel.sent_to("777")[0].text;
        assert!(text.contains("👤 Клиент: Игорь"));
        assert!(text.contains("💰 Итог: 7000"));
    }

    #[tokio::test]
    async fn test_closing_date_defaults_to_now() {
        let h = harness();
        h.notifications
            .order_closed(OrderClosedRequest {
                order_id: 404,
                master_id: 7,
                ..Default::default()
            })
            .await;

        let text = &h.channel.sent_to("777")[0].text;
        assert!(!text.contains("📅 Дата закрытия: Не указано"));
    }

    #[tokio::test]
    async fn test_reassignment_goes_to_old_master() {
        let h = harness();
        h.notifications
            .master_reassigned(MasterReassignedRequest {
                order_id: 50,
                old_master_id: 8,
            })
            .await;

        assert!(h.channel.sent_to("777").is_empty());
        let sent = h.channel.sent_to("888");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "🔄 Заказ №50 передан другому мастеру");
        assert!(sent[0].buttons.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_city_filled_from_record() {
        let h = harness();
        let report = h
            .notifications
            .order_rejection(OrderRejectionRequest {
                order_id: 50,
                master_id: Some(7),
                reason: Some("Незаказ".into()),
                ..Default::default()
            })
            .await;

        assert_eq!(report.outcomes.len(), 2);
        let director_copy = &h.channel.sent_to("111")[0];
        assert!(director_copy.text.starts_with("🚫 Заказ №50: незаказ"));
        assert!(director_copy.text.contains("🏙 Город: Саратов"));
        assert!(!h.channel.sent_to("777")[0].text.contains("🏙 Город"));
    }

    #[tokio::test]
    async fn test_new_order_with_city_still_fills_card_from_record() {
        let h = harness();
        let report = h
            .notifications
            .new_order(NewOrderRequest {
                order_id: 50,
                city: Some("Саратов".into()),
                problem: Some("Не греет".into()),
                ..Default::default()
            })
            .await;

        assert_eq!(report.status, DispatchStatus::Delivered);
        let text = &h.channel.sent_to("111")[0].text;
        assert!(text.contains("РК: Авито"));
        assert!(text.contains("👤 Клиент: Сергей"));
        assert!(text.contains("📞 Телефон: +79990001122"));
        assert!(text.contains("📍 Адрес: ул. Ленина, 1"));
        assert!(text.contains("🗓 Дата встречи: 01.06.2025, 12:00"));
        assert!(text.contains("🔧 Проблема: Не греет"));
    }

    #[tokio::test]
    async fn test_date_change_fills_missing_card_fields() {
        let h = harness();
        h.notifications
            .date_change(DateChangeRequest {
                order_id: 50,
                city: Some("Саратов".into()),
                client_name: Some("Сергей".into()),
                rk: Some("Сайт".into()),
                new_date: Some("2025-06-05T09:00:00Z".into()),
                ..Default::default()
            })
            .await;

        let text = &h.channel.sent_to("111")[0].text;
        assert!(text.contains("РК: Сайт"));
        assert!(text.contains("Направление: Холодильники"));
    }

    #[test]
    fn test_any_missing_treats_blank_as_missing() {
        let given = Some("a".to_string());
        let blank = Some("  ".to_string());
        assert!(!any_missing(&[&given, &given]));
        assert!(any_missing(&[&given, &None]));
        assert!(any_missing(&[&blank]));
    }

    #[tokio::test]
    async fn test_master_assigned_has_order_link() {
        let h = harness();
        h.notifications
            .master_assigned(MasterAssignedRequest {
                order_id: 50,
                master_id: 7,
                ..Default::default()
            })
            .await;

        let sent = h.channel.sent_to("777");
        assert_eq!(sent[0].buttons[0].url, "https://lead-schem.ru/orders/50");
    }
}
