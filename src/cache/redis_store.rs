//! Redis-backed [`CandleStore`].
//!
//! Maps the list operations onto `LLEN`, `LINDEX`, `LPUSH`, `RPUSH`,
//! `RPOP`, `LRANGE` and `DEL`.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::CandleStore;
use crate::Result;

/// Redis list store over an auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Opens a managed connection to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`CandlekeepError::Cache`](crate::CandlekeepError::Cache) if
    /// the URL is invalid or the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!("Connected to Redis cache");

        Ok(Self { conn })
    }
}

#[async_trait]
impl CandleStore for RedisStore {
    async fn size(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }

    async fn front(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let item: Option<String> = conn.lindex(key, 0).await?;
        Ok(item)
    }

    async fn push_front(&self, key: &str, items: &[String]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: usize = conn.lpush(key, items).await?;
        Ok(())
    }

    async fn push_back(&self, key: &str, items: &[String]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: usize = conn.rpush(key, items).await?;
        Ok(())
    }

    async fn pop_back(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let item: Option<String> = conn.rpop(key, None).await?;
        Ok(item)
    }

    async fn get_all(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(items)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: usize = conn.del(key).await?;
        Ok(())
    }
}
