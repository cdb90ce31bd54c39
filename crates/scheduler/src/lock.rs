//! Reminder claims: short-lived exclusive markers on a reminder key.
//!
//! A pass claims `(kind, order, master)` before reading the watermark and
//! releases it after writing, so two scheduler instances never both decide
//! to send the same reminder.
//!
//! The Redis implementation uses `SET NX EX` for an atomic claim whose TTL
//! frees the key if the holder dies mid-send.

use std::collections::HashSet;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use courier_notifier::store::ReminderKey;

/// Default claim lifetime in seconds (5 minutes).
const DEFAULT_CLAIM_TTL_SECONDS: u64 = 300;

#[async_trait]
pub trait ReminderClaims: Send + Sync {
    /// Returns `true` if the caller now holds the key.
    async fn try_claim(&self, key: &ReminderKey) -> anyhow::Result<bool>;

    async fn release(&self, key: &ReminderKey) -> anyhow::Result<()>;
}

/// Claims shared across instances through Redis.
pub struct RedisClaims {
    redis: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisClaims {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            ttl_seconds: DEFAULT_CLAIM_TTL_SECONDS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    fn redis_key(key: &ReminderKey) -> String {
        format!("reminder:claim:{}", key)
    }
}

#[async_trait]
impl ReminderClaims for RedisClaims {
    async fn try_claim(&self, key: &ReminderKey) -> anyhow::Result<bool> {
        // ConnectionManager is a cheap handle; commands need it mutably.
        let mut redis = self.redis.clone();

        // SET key "1" NX EX ttl
        // Some("OK") when the key was set, None when someone else holds it
        let result: Option<String> = redis::cmd("SET")
            .arg(Self::redis_key(key))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut redis)
            .await?;

        let claimed = result.is_some();
        if !claimed {
            tracing::debug!(key = %key, "Reminder already claimed elsewhere");
        }

        Ok(claimed)
    }

    async fn release(&self, key: &ReminderKey) -> anyhow::Result<()> {
        let mut redis = self.redis.clone();
        redis.del::<_, ()>(Self::redis_key(key)).await?;
        Ok(())
    }
}

/// Claims held in this process only. Enough for a single instance.
#[derive(Default)]
pub struct LocalClaims {
    held: Mutex<HashSet<ReminderKey>>,
}

impl LocalClaims {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderClaims for LocalClaims {
    async fn try_claim(&self, key: &ReminderKey) -> anyhow::Result<bool> {
        Ok(self.held.lock().await.insert(key.clone()))
    }

    async fn release(&self, key: &ReminderKey) -> anyhow::Result<()> {
        self.held.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_notifier::EventKind;

    #[test]
    fn test_redis_key_format() {
        let key = ReminderKey::new(EventKind::CloseOrderReminder, 42, 7);
        assert_eq!(
            RedisClaims::redis_key(&key),
            "reminder:claim:close_order_reminder:42:7"
        );
    }

    #[tokio::test]
    async fn test_local_claim_is_exclusive_until_released() {
        let claims = LocalClaims::new();
        let key = ReminderKey::new(EventKind::ModernClosingReminder, 1, 2);
        let other = ReminderKey::new(EventKind::ModernClosingReminder, 1, 3);

        assert!(claims.try_claim(&key).await.unwrap());
        assert!(!claims.try_claim(&key).await.unwrap());
        assert!(claims.try_claim(&other).await.unwrap());

        claims.release(&key).await.unwrap();
        assert!(claims.try_claim(&key).await.unwrap());
    }
}
