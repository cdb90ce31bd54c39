//! PostgreSQL-backed stores.
//!
//! The `directors`, `masters` and `orders` tables belong to the CRM and are
//! only read. Their timestamp columns are `timestamp without time zone`
//! holding UTC, so they are converted with `AT TIME ZONE 'UTC'` on the way
//! in and out. `notification_log` and `reminder_watermarks` are created by
//! this service's migrations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{AddressField, DirectorRecord, MasterRecord, OrderDetails, OrderRecord};

use crate::store::{DeliveryRecord, HistoryStore, OrderStore, RecipientStore, ReminderKey};

/// Reads CRM records and persists notification history.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    director_address: AddressField,
    master_address: AddressField,
}

impl PgStore {
    pub fn new(pool: PgPool, director_address: AddressField, master_address: AddressField) -> Self {
        Self {
            pool,
            director_address,
            master_address,
        }
    }

    fn order_columns() -> &'static str {
        r#"
            o.id::bigint AS id,
            o.status_order AS status,
            o.client_name,
            o.city,
            o.master_id::bigint AS master_id,
            o.date_meeting AT TIME ZONE 'UTC' AS date_meeting,
            o.date_closmod AT TIME ZONE 'UTC' AS expected_closing_date,
            o.updated_at AT TIME ZONE 'UTC' AS updated_at,
            o.rk,
            o.avito_name,
            o.type_equipment
        "#
    }
}

#[async_trait]
impl RecipientStore for PgStore {
    async fn find_directors_by_city(&self, city: &str) -> Result<Vec<DirectorRecord>, AppError> {
        // The column name comes from a closed enum, never from input.
        let sql = format!(
            r#"
            SELECT id::bigint AS id, name, cities, NULLIF(TRIM({}), '') AS channel_address
            FROM directors
            WHERE $1 = ANY(cities)
            ORDER BY name ASC
            "#,
            self.director_address.column()
        );

        let directors: Vec<DirectorRecord> = sqlx::query_as(&sql)
            .bind(city)
            .fetch_all(&self.pool)
            .await?;

        Ok(directors)
    }

    async fn find_master_by_id(&self, id: i64) -> Result<Option<MasterRecord>, AppError> {
        let sql = format!(
            r#"
            SELECT id::bigint AS id, name, NULLIF(TRIM({}), '') AS channel_address
            FROM masters
            WHERE id = $1
            "#,
            self.master_address.column()
        );

        let master: Option<MasterRecord> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(master)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_orders_pending_closure(
        &self,
        statuses: &[&str],
        meeting_before: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM orders o
            JOIN masters m ON m.id = o.master_id
            WHERE o.status_order = ANY($1)
              AND o.date_meeting <= ($2 AT TIME ZONE 'UTC')
              AND NULLIF(TRIM(m.{}), '') IS NOT NULL
            ORDER BY o.id ASC
            "#,
            Self::order_columns(),
            self.master_address.column()
        );
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();

        let orders: Vec<OrderRecord> = sqlx::query_as(&sql)
            .bind(statuses)
            .bind(meeting_before)
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }

    async fn find_orders_in_status(&self, status: &str) -> Result<Vec<OrderRecord>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM orders o
            JOIN masters m ON m.id = o.master_id
            WHERE o.status_order = $1
              AND NULLIF(TRIM(m.{}), '') IS NOT NULL
            ORDER BY o.id ASC
            "#,
            Self::order_columns(),
            self.master_address.column()
        );

        let orders: Vec<OrderRecord> = sqlx::query_as(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }

    async fn find_order_details(&self, id: i64) -> Result<Option<OrderDetails>, AppError> {
        let details: Option<OrderDetails> = sqlx::query_as(
            r#"
            SELECT
                id::bigint AS id,
                client_name,
                phone,
                address,
                city,
                rk,
                avito_name,
                type_equipment,
                date_meeting AT TIME ZONE 'UTC' AS date_meeting,
                date_closmod AT TIME ZONE 'UTC' AS expected_closing_date,
                closing_data AT TIME ZONE 'UTC' AS closing_date,
                result::text AS total,
                expenditure::text AS expense,
                clean::text AS net,
                master_change::text AS handover
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(details)
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn record_delivery(&self, record: &DeliveryRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notification_log
                (id, kind, order_id, recipient_type, recipient_id, success, attempts, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.kind.as_str())
        .bind(record.order_id)
        .bind(record.recipient_type)
        .bind(record.recipient_id)
        .bind(record.success)
        .bind(record.attempts as i32)
        .bind(&record.error)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn last_reminder_sent_at(
        &self,
        key: &ReminderKey,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT last_sent_at
            FROM reminder_watermarks
            WHERE kind = $1 AND order_id = $2 AND master_id = $3
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.order_id)
        .bind(key.master_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(at,)| at))
    }

    async fn record_reminder_sent(
        &self,
        key: &ReminderKey,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO reminder_watermarks (kind, order_id, master_id, last_sent_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, order_id, master_id) DO UPDATE SET last_sent_at = EXCLUDED.last_sent_at
            "#,
        )
        .bind(key.kind.as_str())
        .bind(key.order_id)
        .bind(key.master_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
