use std::str::FromStr;

use chrono_tz::Tz;

use crate::types::AddressField;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port (default: 5008)
    pub port: u16,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 15)
    pub db_max_connections: u32,

    /// Redis connection string. When unset, reminder claims are kept in-process.
    pub redis_url: Option<String>,

    /// Shared secret expected in the `X-Webhook-Token` header
    pub webhook_token: String,

    /// Telegram bot token. Deliveries fail fast when it is missing.
    pub telegram_bot_token: Option<String>,

    /// Telegram Bot API base URL
    pub telegram_api_url: String,

    /// Base URL for order deep links sent to directors
    pub director_order_url: String,

    /// Base URL for order deep links sent to masters
    pub master_order_url: String,

    /// Which director column holds the Telegram destination
    pub director_address_field: AddressField,

    /// Which master column holds the Telegram destination
    pub master_address_field: AddressField,

    /// Reminder cadence settings
    pub reminders: ReminderConfig,

    /// Run the reminder timers inside the API process (default: true)
    pub scheduler_enabled: bool,
}

/// Settings for the close-order and modern-closing reminder passes.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Hours after the meeting before the first close-order reminder (default: 3)
    pub first_reminder_hours: i64,

    /// Hours between consecutive close-order reminders (default: 3)
    pub reminder_interval_hours: i64,

    /// Days since the last update before a dateless modern order is nagged (default: 3)
    pub modern_reminder_days: i64,

    /// Local hour of day at which the modern pass runs (default: 10)
    pub modern_reminder_hour: u32,

    /// Time zone used for calendar-day math and message dates (default: Europe/Moscow)
    pub timezone: Tz,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            first_reminder_hours: 3,
            reminder_interval_hours: 3,
            modern_reminder_days: 3,
            modern_reminder_hour: 10,
            timezone: chrono_tz::Europe::Moscow,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let reminders = ReminderConfig {
            first_reminder_hours: parse_var("FIRST_REMINDER_HOURS", 3)?,
            reminder_interval_hours: parse_var("REMINDER_INTERVAL_HOURS", 3)?,
            modern_reminder_days: parse_var("MODERN_REMINDER_DAYS", 3)?,
            modern_reminder_hour: parse_var("MODERN_REMINDER_HOUR", 10)?,
            timezone: parse_var("REMINDER_TIMEZONE", chrono_tz::Europe::Moscow)?,
        };
        if reminders.modern_reminder_hour > 23 {
            anyhow::bail!("MODERN_REMINDER_HOUR must be between 0 and 23");
        }

        Ok(Self {
            port: parse_var("PORT", 5008)?,
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 15)?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            webhook_token: std::env::var("WEBHOOK_TOKEN")
                .map_err(|_| anyhow::anyhow!("WEBHOOK_TOKEN environment variable is required"))?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
            telegram_api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            director_order_url: std::env::var("DIRECTOR_ORDER_URL")
                .unwrap_or_else(|_| "https://new.lead-schem.ru".to_string()),
            master_order_url: std::env::var("MASTER_ORDER_URL")
                .unwrap_or_else(|_| "https://lead-schem.ru".to_string()),
            director_address_field: parse_var("DIRECTOR_ADDRESS_FIELD", AddressField::TgId)?,
            master_address_field: parse_var("MASTER_ADDRESS_FIELD", AddressField::ChatId)?,
            reminders,
            scheduler_enabled: parse_var("SCHEDULER_ENABLED", true)?,
        })
    }
}

/// Read an optional variable, falling back to `default` when it is unset.
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reminder_defaults() {
        let config = ReminderConfig::default();
        assert_eq!(config.first_reminder_hours, 3);
        assert_eq!(config.reminder_interval_hours, 3);
        assert_eq!(config.modern_reminder_days, 3);
        assert_eq!(config.modern_reminder_hour, 10);
        assert_eq!(config.timezone, chrono_tz::Europe::Moscow);
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        let value: u32 = parse_var("COURIER_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
