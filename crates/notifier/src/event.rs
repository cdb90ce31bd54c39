//! Event model.
//!
//! Callers outside the process speak [`RawEvent`]: a kind name plus an open
//! JSON map. It is converted once, at the boundary, into an [`Event`] whose
//! [`EventDetails`] is a closed, typed record per kind.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchError;

/// Discriminator selecting template and recipient policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewOrder,
    DateChange,
    OrderRejection,
    MasterAssigned,
    MasterReassigned,
    OrderAccepted,
    OrderClosed,
    OrderInModern,
    CloseOrderReminder,
    ModernClosingReminder,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::NewOrder,
        EventKind::DateChange,
        EventKind::OrderRejection,
        EventKind::MasterAssigned,
        EventKind::MasterReassigned,
        EventKind::OrderAccepted,
        EventKind::OrderClosed,
        EventKind::OrderInModern,
        EventKind::CloseOrderReminder,
        EventKind::ModernClosingReminder,
    ];

    /// Wire name, as used in webhook payloads and history records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewOrder => "new_order",
            EventKind::DateChange => "date_change",
            EventKind::OrderRejection => "order_rejection",
            EventKind::MasterAssigned => "master_assigned",
            EventKind::MasterReassigned => "master_reassigned",
            EventKind::OrderAccepted => "order_accepted",
            EventKind::OrderClosed => "order_closed",
            EventKind::OrderInModern => "order_in_modern",
            EventKind::CloseOrderReminder => "close_order_reminder",
            EventKind::ModernClosingReminder => "modern_closing_reminder",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownTemplate(s.to_string()))
    }
}

/// Advertising source fields shown at the top of most order messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderCard {
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewOrder {
    pub card: OrderCard,
    pub client_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_meeting: Option<String>,
    pub problem: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateChange {
    pub card: OrderCard,
    pub client_name: Option<String>,
    pub new_date: Option<String>,
    pub old_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderRejection {
    pub card: OrderCard,
    pub client_name: Option<String>,
    pub phone: Option<String>,
    pub date_meeting: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterAssigned {
    pub card: OrderCard,
    pub client_name: Option<String>,
    pub address: Option<String>,
    pub date_meeting: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderAccepted {
    pub card: OrderCard,
    pub client_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_meeting: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderClosed {
    pub client_name: Option<String>,
    pub closing_date: Option<String>,
    pub total: Option<String>,
    pub expense: Option<String>,
    pub net: Option<String>,
    pub handover: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderInModern {
    pub card: OrderCard,
    pub client_name: Option<String>,
    pub date_meeting: Option<String>,
    pub prepayment: Option<String>,
    pub expected_closing_date: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseOrderReminder {
    pub card: OrderCard,
    pub client_name: Option<String>,
    pub date_meeting: Option<String>,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModernClosingReminder {
    pub card: OrderCard,
    pub client_name: Option<String>,
    pub date_meeting: Option<String>,
    pub expected_closing_date: Option<String>,
    /// Negative when the closing date has passed.
    pub days_until_closing: i64,
}

/// Typed render fields, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDetails {
    NewOrder(NewOrder),
    DateChange(DateChange),
    OrderRejection(OrderRejection),
    MasterAssigned(MasterAssigned),
    MasterReassigned,
    OrderAccepted(OrderAccepted),
    OrderClosed(OrderClosed),
    OrderInModern(OrderInModern),
    CloseOrderReminder(CloseOrderReminder),
    ModernClosingReminder(ModernClosingReminder),
}

impl EventDetails {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetails::NewOrder(_) => EventKind::NewOrder,
            EventDetails::DateChange(_) => EventKind::DateChange,
            EventDetails::OrderRejection(_) => EventKind::OrderRejection,
            EventDetails::MasterAssigned(_) => EventKind::MasterAssigned,
            EventDetails::MasterReassigned => EventKind::MasterReassigned,
            EventDetails::OrderAccepted(_) => EventKind::OrderAccepted,
            EventDetails::OrderClosed(_) => EventKind::OrderClosed,
            EventDetails::OrderInModern(_) => EventKind::OrderInModern,
            EventDetails::CloseOrderReminder(_) => EventKind::CloseOrderReminder,
            EventDetails::ModernClosingReminder(_) => EventKind::ModernClosingReminder,
        }
    }

    /// Build typed details for `kind` from an open payload map.
    ///
    /// Never fails: absent or non-scalar values become `None`.
    pub fn from_map(kind: EventKind, data: &Map<String, Value>) -> Self {
        let fields = Fields(data);
        match kind {
            EventKind::NewOrder => EventDetails::NewOrder(NewOrder {
                card: fields.card(),
                client_name: fields.text("clientName"),
                phone: fields.text("phone"),
                address: fields.text("address"),
                date_meeting: fields.text("dateMeeting"),
                problem: fields.text("problem"),
            }),
            EventKind::DateChange => EventDetails::DateChange(DateChange {
                card: fields.card(),
                client_name: fields.text("clientName"),
                new_date: fields.text("newDate"),
                old_date: fields.text("oldDate"),
            }),
            EventKind::OrderRejection => EventDetails::OrderRejection(OrderRejection {
                card: fields.card(),
                client_name: fields.text("clientName"),
                phone: fields.text("phone"),
                date_meeting: fields.text("dateMeeting"),
                reason: fields.text("reason"),
            }),
            EventKind::MasterAssigned => EventDetails::MasterAssigned(MasterAssigned {
                card: fields.card(),
                client_name: fields.text("clientName"),
                address: fields.text("address"),
                date_meeting: fields.text("dateMeeting"),
            }),
            EventKind::MasterReassigned => EventDetails::MasterReassigned,
            EventKind::OrderAccepted => EventDetails::OrderAccepted(OrderAccepted {
                card: fields.card(),
                client_name: fields.text("clientName"),
                phone: fields.text("phone"),
                address: fields.text("address"),
                date_meeting: fields.text("dateMeeting"),
            }),
            EventKind::OrderClosed => EventDetails::OrderClosed(OrderClosed {
                client_name: fields.text("clientName"),
                closing_date: fields.text("closingDate"),
                total: fields.text("total"),
                expense: fields.text("expense"),
                net: fields.text("net"),
                handover: fields.text("handover"),
            }),
            EventKind::OrderInModern => EventDetails::OrderInModern(OrderInModern {
                card: fields.card(),
                client_name: fields.text("clientName"),
                date_meeting: fields.text("dateMeeting"),
                prepayment: fields.text("prepayment"),
                expected_closing_date: fields.text("expectedClosingDate"),
                comment: fields.text("comment"),
            }),
            EventKind::CloseOrderReminder => EventDetails::CloseOrderReminder(CloseOrderReminder {
                card: fields.card(),
                client_name: fields.text("clientName"),
                date_meeting: fields.text("dateMeeting"),
                days_overdue: fields.int("daysOverdue").unwrap_or(0),
            }),
            EventKind::ModernClosingReminder => {
                EventDetails::ModernClosingReminder(ModernClosingReminder {
                    card: fields.card(),
                    client_name: fields.text("clientName"),
                    date_meeting: fields.text("dateMeeting"),
                    expected_closing_date: fields.text("expectedClosingDate"),
                    days_until_closing: fields.int("daysUntilClosing").unwrap_or(0),
                })
            }
        }
    }
}

/// A notification-worthy order lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub order_id: i64,
    pub city: Option<String>,
    pub master_id: Option<i64>,
    pub details: EventDetails,
}

impl Event {
    pub fn new(order_id: i64, details: EventDetails) -> Self {
        Self {
            order_id,
            city: None,
            master_id: None,
            details,
        }
    }

    pub fn with_city(mut self, city: Option<String>) -> Self {
        self.city = city.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_master(mut self, master_id: Option<i64>) -> Self {
        self.master_id = master_id;
        self
    }

    pub fn kind(&self) -> EventKind {
        self.details.kind()
    }

    /// Convert a boundary payload. Fails only for an unrecognized kind.
    pub fn from_raw(raw: RawEvent) -> Result<Self, DispatchError> {
        let kind: EventKind = raw.kind.parse()?;
        let details = EventDetails::from_map(kind, &raw.data);
        Ok(Event::new(raw.order_id, details)
            .with_city(raw.city)
            .with_master(raw.master_id))
    }
}

/// Generic notification request as received over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub order_id: i64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub master_id: Option<i64>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Read-only view over a payload map with lenient scalar coercion.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(scalar_text)
    }

    fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn card(&self) -> OrderCard {
        OrderCard {
            rk: self.text("rk"),
            avito_name: self.text("avitoName"),
            type_equipment: self.text("typeEquipment"),
        }
    }
}

/// Render a JSON scalar as text; blank strings, nulls and containers are absent.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Serde adapter for optional text fields that may arrive as numbers.
pub fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(kind: &str, data: Value) -> RawEvent {
        RawEvent {
            kind: kind.to_string(),
            order_id: 42,
            city: Some("Москва".to_string()),
            master_id: Some(7),
            data: data.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = Event::from_raw(raw("order_exploded", json!({}))).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTemplate(ref k) if k == "order_exploded"));
    }

    #[test]
    fn test_from_raw_coerces_scalars() {
        let event = Event::from_raw(raw(
            "order_closed",
            json!({ "clientName": "Иван", "total": 5000, "net": "3500", "expense": null }),
        ))
        .unwrap();

        assert_eq!(event.kind(), EventKind::OrderClosed);
        let EventDetails::OrderClosed(closed) = event.details else {
            panic!("expected order_closed details");
        };
        assert_eq!(closed.client_name.as_deref(), Some("Иван"));
        assert_eq!(closed.total.as_deref(), Some("5000"));
        assert_eq!(closed.net.as_deref(), Some("3500"));
        assert_eq!(closed.expense, None);
    }

    #[test]
    fn test_from_raw_ignores_containers_and_blank_strings() {
        let event = Event::from_raw(raw(
            "new_order",
            json!({ "clientName": "   ", "phone": ["+7"], "address": { "street": "x" } }),
        ))
        .unwrap();
        let EventDetails::NewOrder(order) = event.details else {
            panic!("expected new_order details");
        };
        assert_eq!(order, NewOrder::default());
    }

    #[test]
    fn test_days_fields_accept_strings() {
        let event = Event::from_raw(raw(
            "modern_closing_reminder",
            json!({ "daysUntilClosing": "-2" }),
        ))
        .unwrap();
        let EventDetails::ModernClosingReminder(reminder) = event.details else {
            panic!("expected modern_closing_reminder details");
        };
        assert_eq!(reminder.days_until_closing, -2);
    }

    #[test]
    fn test_blank_city_is_dropped() {
        let event = Event::new(1, EventDetails::MasterReassigned).with_city(Some(" ".into()));
        assert_eq!(event.city, None);
    }
}
