use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One sales-feed subscription row: deliver sales of at least
/// `minimum_sale_amount` tez to `channel_id` in `guild_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedSubscription {
    pub guild_id: i64,
    pub channel_id: i64,
    pub minimum_sale_amount: i64,
}

/// Read side of the subscription table as seen by the scheduler: an
/// immutable snapshot fetched once per block iteration. The scheduler
/// never mutates subscriptions; the API layer does, concurrently.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn list_subscriptions(&self) -> Result<Vec<FeedSubscription>>;
}

#[derive(Clone)]
pub struct SqliteSubscriptionStore {
    pool: sqlx::SqlitePool,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or update a feed channel. Returns the previous minimum amount
    /// when an existing record was overridden.
    pub async fn set_feed(
        &self,
        guild_id: i64,
        channel_id: i64,
        minimum_sale_amount: i64,
    ) -> Result<Option<i64>> {
        let existing = self.feed_amount(guild_id, channel_id).await?;
        let created_at = now_secs();
        sqlx::query(
            r#"
            INSERT INTO sales_feeds (guild_id, channel_id, minimum_sale_amount, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (guild_id, channel_id)
            DO UPDATE SET minimum_sale_amount = excluded.minimum_sale_amount
            "#,
        )
        .bind(guild_id)
        .bind(channel_id)
        .bind(minimum_sale_amount)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(existing)
    }

    /// Remove a feed channel. Returns false when no record existed.
    pub async fn remove_feed(&self, guild_id: i64, channel_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM sales_feeds WHERE guild_id = ? AND channel_id = ?",
        )
        .bind(guild_id)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Minimum sale amount for one channel, if subscribed.
    pub async fn feed_amount(&self, guild_id: i64, channel_id: i64) -> Result<Option<i64>> {
        let amount: Option<i64> = sqlx::query_scalar(
            "SELECT minimum_sale_amount FROM sales_feeds WHERE guild_id = ? AND channel_id = ?",
        )
        .bind(guild_id)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(amount)
    }
}

#[async_trait]
impl SubscriptionSource for SqliteSubscriptionStore {
    async fn list_subscriptions(&self) -> Result<Vec<FeedSubscription>> {
        let feeds = sqlx::query_as::<_, FeedSubscription>(
            "SELECT guild_id, channel_id, minimum_sale_amount FROM sales_feeds",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> SqliteSubscriptionStore {
        // Single connection — an in-memory database exists per connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        SqliteSubscriptionStore::new(pool)
    }

    #[tokio::test]
    async fn set_list_remove_roundtrip() {
        let store = test_store().await;

        assert_eq!(store.set_feed(1, 10, 0).await.unwrap(), None);
        assert_eq!(store.set_feed(2, 20, 5).await.unwrap(), None);

        let mut feeds = store.list_subscriptions().await.unwrap();
        feeds.sort_by_key(|f| f.guild_id);
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].channel_id, 10);
        assert_eq!(feeds[0].minimum_sale_amount, 0);
        assert_eq!(feeds[1].minimum_sale_amount, 5);

        assert!(store.remove_feed(1, 10).await.unwrap());
        assert!(!store.remove_feed(1, 10).await.unwrap());
        assert_eq!(store.list_subscriptions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_reports_previous_amount() {
        let store = test_store().await;

        assert_eq!(store.set_feed(1, 10, 3).await.unwrap(), None);
        assert_eq!(store.set_feed(1, 10, 8).await.unwrap(), Some(3));
        assert_eq!(store.feed_amount(1, 10).await.unwrap(), Some(8));
    }
}
