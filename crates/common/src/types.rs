use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order statuses in which the master still has to close the order.
pub const PENDING_CLOSURE_STATUSES: [&str; 3] = ["Принял", "В пути", "В работе"];

/// Order status for deferred ("modern") closure.
pub const MODERN_STATUS: &str = "Модерн";

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum RecipientType {
    Director,
    Master,
}

impl std::fmt::Display for RecipientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientType::Director => write!(f, "director"),
            RecipientType::Master => write!(f, "master"),
        }
    }
}

/// The record column that holds a recipient's Telegram destination.
///
/// Deployments differ on whether `tg_id` or `chat_id` is populated, so the
/// column is chosen by configuration rather than assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressField {
    TgId,
    ChatId,
}

impl AddressField {
    /// Column name in the directors/masters tables.
    pub fn column(&self) -> &'static str {
        match self {
            AddressField::TgId => "tg_id",
            AddressField::ChatId => "chat_id",
        }
    }
}

impl std::fmt::Display for AddressField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for AddressField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tg_id" | "tgId" => Ok(AddressField::TgId),
            "chat_id" | "chatId" => Ok(AddressField::ChatId),
            other => Err(format!(
                "unknown address field '{}', expected tg_id or chat_id",
                other
            )),
        }
    }
}

/// A city-scoped director, with the configured address column projected
/// into `channel_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DirectorRecord {
    pub id: i64,
    pub name: String,
    pub cities: Vec<String>,
    pub channel_address: Option<String>,
}

/// A field worker, with the configured address column projected into
/// `channel_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MasterRecord {
    pub id: i64,
    pub name: String,
    pub channel_address: Option<String>,
}

/// Order state scanned by the reminder passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: i64,
    pub status: String,
    pub client_name: Option<String>,
    pub city: Option<String>,
    pub master_id: Option<i64>,
    pub date_meeting: Option<DateTime<Utc>>,
    pub expected_closing_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
}

/// Order fields used to complete a notification when the caller sent a
/// partial payload. Money columns are read as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderDetails {
    pub id: i64,
    pub client_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub rk: Option<String>,
    pub avito_name: Option<String>,
    pub type_equipment: Option<String>,
    pub date_meeting: Option<DateTime<Utc>>,
    pub expected_closing_date: Option<DateTime<Utc>>,
    pub closing_date: Option<DateTime<Utc>>,
    pub total: Option<String>,
    pub expense: Option<String>,
    pub net: Option<String>,
    pub handover: Option<String>,
}
