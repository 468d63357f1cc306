use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use tracing::{info, instrument};

use super::{CLAIM_VALUE, ClaimKey, ClaimStore};
use crate::error::{AppError, AppResult};

/// Redis-backed claim store.
///
/// The connection manager reconnects on its own, so a Redis restart shows up
/// as `StoreUnavailable` for the calls in flight and recovers afterwards.
#[derive(Clone)]
pub struct RedisClaimStore {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisClaimStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if the URL is invalid or the server
    /// does not accept the connection within `timeout`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str, timeout: Duration) -> AppResult<Self> {
        let client = Client::open(url).map_err(map_redis_error)?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                AppError::StoreUnavailable(format!("connecting to Redis timed out after {timeout:?}"))
            })?
            .map_err(map_redis_error)?;

        info!("Connected to Redis claim store");
        Ok(Self { conn, timeout })
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, RedisError>>,
    ) -> AppResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                AppError::StoreUnavailable(format!("Redis call timed out after {:?}", self.timeout))
            })?
            .map_err(map_redis_error)
    }
}

#[async_trait]
impl ClaimStore for RedisClaimStore {
    async fn try_claim(&self, key: &ClaimKey, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        // EX is whole seconds; sub-second TTLs are rejected by config validation
        let ttl_secs = ttl.as_secs().max(1);

        let result: Option<String> = self
            .bounded(
                redis::cmd("SET")
                    .arg(key.as_str())
                    .arg(CLAIM_VALUE)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl_secs)
                    .query_async(&mut conn),
            )
            .await?;

        Ok(result.is_some())
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: String = self
            .bounded(redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}

fn map_redis_error(err: RedisError) -> AppError {
    AppError::StoreUnavailable(err.to_string())
}
