use core::time::Duration;

use redis::{Client, Script, aio::ConnectionManager};

use crate::lease::{CoordinationStore, StoreError};

/// Deletes `KEYS[1]` only if it still holds `ARGV[1]`.
const DELETE_IF_EQUALS: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// A [`CoordinationStore`] backed by Redis.
///
/// Commands go through a [`ConnectionManager`], which multiplexes callers on
/// one connection and reconnects after a failure. Cloning is cheap and shares
/// the connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    delete_if_equals: Script,
}

impl RedisStore {
    /// Connects to the Redis server at `url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Redis`] if the URL is malformed or the server
    /// cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!("Connected to coordination store");
        Ok(Self {
            connection,
            delete_if_equals: Script::new(DELETE_IF_EQUALS),
        })
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl CoordinationStore for RedisStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut connection = self.connection.clone();
        let value: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut connection)
            .await?;
        Ok(value)
    }

    async fn set_if_absent(&self, key: &str, value: i64, ttl: Duration) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut connection)
            .await?;
        match reply.as_deref() {
            Some("OK") => Ok(true),
            None => Ok(false),
            Some(other) => Err(StoreError::Protocol(format!(
                "SET NX replied `{other}`"
            ))),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut connection)
            .await?;
        Ok(updated == 1)
    }

    async fn delete_if_equals(&self, key: &str, value: i64) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let deleted: i64 = self
            .delete_if_equals
            .key(key)
            .arg(value)
            .invoke_async(&mut connection)
            .await?;
        Ok(deleted == 1)
    }
}
