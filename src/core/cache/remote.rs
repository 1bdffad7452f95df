//! Remote key-value cache layer (L3)
//!
//! The layer is optional: the scanner works identically without it, just
//! with a colder cache. Any store satisfying `RemoteKv` plugs in;
//! the Redis implementation ships behind the `remote-cache` feature.

use std::marker::PhantomData;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{CacheHit, CacheLayer, CacheStats};
use crate::core::error::Result;

/// Minimal byte-oriented remote store contract.
pub trait RemoteKv: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
    fn delete(&self, key: &str) -> Result<bool>;
    fn clear(&self) -> Result<()>;
}

/// Envelope stored remotely; carries its own expiry so remaining TTL can be
/// computed without store-specific TTL queries.
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    created_at: i64,
    ttl_secs: u64,
    value: T,
}

/// Adapts a `RemoteKv` into the typed `CacheLayer` contract.
pub struct RemoteLayer<T> {
    kv: Box<dyn RemoteKv>,
    counters: Mutex<CacheStats>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RemoteLayer<T> {
    #[must_use]
    pub fn new(kv: Box<dyn RemoteKv>) -> Self {
        Self {
            kv,
            counters: Mutex::new(CacheStats::default()),
            _marker: PhantomData,
        }
    }
}

impl<T> CacheLayer<T> for RemoteLayer<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, key: &str) -> Option<CacheHit<T>> {
        let bytes = match self.kv.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.counters.lock().misses += 1;
                return None;
            }
            Err(err) => {
                // Remote failures degrade to a miss; the scan continues.
                tracing::warn!(key, error = %err, "remote cache read failed");
                self.counters.lock().misses += 1;
                return None;
            }
        };

        let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(key, error = %err, "invalidating malformed remote entry");
                let _ = self.kv.delete(key);
                self.counters.lock().misses += 1;
                return None;
            }
        };

        let now = jiff::Timestamp::now().as_second();
        let expires_at = envelope.created_at + envelope.ttl_secs as i64;
        if expires_at <= now {
            let _ = self.kv.delete(key);
            let mut counters = self.counters.lock();
            counters.misses += 1;
            counters.evictions += 1;
            return None;
        }

        self.counters.lock().hits += 1;
        Some(CacheHit {
            value: envelope.value,
            remaining_ttl: Duration::from_secs((expires_at - now).max(0) as u64),
        })
    }

    fn set(&self, key: &str, value: T, ttl: Duration) {
        let envelope = Envelope {
            created_at: jiff::Timestamp::now().as_second(),
            ttl_secs: ttl.as_secs(),
            value,
        };
        match serde_json::to_vec(&envelope) {
            Ok(bytes) => {
                if let Err(err) = self.kv.set(key, &bytes, ttl) {
                    tracing::warn!(key, error = %err, "remote cache write failed");
                }
            }
            Err(err) => tracing::warn!(key, error = %err, "remote cache encode failed"),
        }
    }

    fn delete(&self, key: &str) -> bool {
        self.kv.delete(key).unwrap_or(false)
    }

    fn clear(&self) {
        if let Err(err) = self.kv.clear() {
            tracing::warn!(error = %err, "remote cache clear failed");
        }
    }

    fn stats(&self) -> CacheStats {
        *self.counters.lock()
    }
}

/// Redis-backed remote store.
#[cfg(feature = "remote-cache")]
pub struct RedisStore {
    connection: Mutex<redis::Connection>,
    prefix: String,
}

#[cfg(feature = "remote-cache")]
impl RedisStore {
    /// Connect to the Redis instance at `url`
    /// (e.g. `redis://:password@host:6379/0`).
    pub fn connect(url: &str) -> Result<Self> {
        use crate::core::error::NullVoidError;

        let client = redis::Client::open(url)
            .map_err(|e| NullVoidError::Cache(format!("redis url: {e}")))?;
        let connection = client
            .get_connection()
            .map_err(|e| NullVoidError::Cache(format!("redis connect: {e}")))?;
        Ok(Self {
            connection: Mutex::new(connection),
            prefix: "nullvoid:".to_string(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[cfg(feature = "remote-cache")]
impl RemoteKv for RedisStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use crate::core::error::NullVoidError;
        use redis::Commands;

        let mut conn = self.connection.lock();
        conn.get(self.full_key(key))
            .map_err(|e| NullVoidError::Cache(e.to_string()))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        use crate::core::error::NullVoidError;
        use redis::Commands;

        let mut conn = self.connection.lock();
        conn.set_ex::<_, _, ()>(self.full_key(key), value, ttl.as_secs().max(1))
            .map_err(|e| NullVoidError::Cache(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        use crate::core::error::NullVoidError;
        use redis::Commands;

        let mut conn = self.connection.lock();
        let removed: u64 = conn
            .del(self.full_key(key))
            .map_err(|e| NullVoidError::Cache(e.to_string()))?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<()> {
        use crate::core::error::NullVoidError;
        use redis::Commands;

        let mut conn = self.connection.lock();
        let keys: Vec<String> = conn
            .keys(format!("{}*", self.prefix))
            .map_err(|e| NullVoidError::Cache(e.to_string()))?;
        if !keys.is_empty() {
            conn.del::<_, ()>(keys)
                .map_err(|e| NullVoidError::Cache(e.to_string()))?;
        }
        Ok(())
    }
}
