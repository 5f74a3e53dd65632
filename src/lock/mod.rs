//! Per-pool mutual exclusion.
//!
//! A [`LockStore`] offers atomic check-and-set / compare-and-delete on
//! string keys with a TTL. [`PoolLockManager`] layers the key scheme
//! `ride_pool:{pool_id}` and a bounded retry policy on top. Locks only
//! serialize writers; the version check on [`crate::domain::PoolRepository::save`]
//! still rejects anything that slips past an expired lock.

pub mod memory;
pub mod postgres;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LockConfig;
use crate::domain::PoolId;
use crate::error::GatewayError;

pub use memory::InMemoryLockStore;
pub use postgres::PostgresLockStore;

/// Opaque proof of lock ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(uuid::Uuid);

impl LockToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wraps a stored token.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keyed locks with expiry.
#[async_trait]
pub trait LockStore: Send + Sync + fmt::Debug {
    /// Takes `key` for `ttl` if nobody holds an unexpired lock on it.
    ///
    /// Returns `None` when the key is held.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if the store is unreachable.
    async fn try_acquire(&self, key: &str, ttl: Duration)
    -> Result<Option<LockToken>, GatewayError>;

    /// Deletes `key` only if it is still held under `token`.
    ///
    /// Returns `false` when the lock expired or was taken by someone else.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if the store is unreachable.
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, GatewayError>;
}

/// A held pool lock. Hand it back to [`PoolLockManager::release`].
#[derive(Debug)]
#[must_use = "a pool lock must be released"]
pub struct PoolLock {
    pool_id: PoolId,
    key: String,
    token: LockToken,
}

impl PoolLock {
    /// Locked pool.
    #[must_use]
    pub const fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    /// Ownership token.
    #[must_use]
    pub const fn token(&self) -> &LockToken {
        &self.token
    }
}

/// Acquires and releases pool locks with bounded retries.
#[derive(Debug, Clone)]
pub struct PoolLockManager {
    store: Arc<dyn LockStore>,
    config: LockConfig,
}

impl PoolLockManager {
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Store key for a pool.
    #[must_use]
    pub fn lock_key(pool_id: PoolId) -> String {
        format!("ride_pool:{pool_id}")
    }

    /// Locks `pool_id`, retrying `max_retries` times with `retry_delay`
    /// between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::LockTimeout`] once the retries are spent and
    /// propagates store failures.
    pub async fn acquire(&self, pool_id: PoolId) -> Result<PoolLock, GatewayError> {
        let key = Self::lock_key(pool_id);
        let attempts = self.config.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            if let Some(token) = self.store.try_acquire(&key, self.config.ttl).await? {
                tracing::debug!(%pool_id, attempt, "pool lock acquired");
                return Ok(PoolLock {
                    pool_id,
                    key,
                    token,
                });
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        tracing::warn!(%pool_id, attempts, "pool lock not acquired");
        Err(GatewayError::LockTimeout {
            pool_id: *pool_id.as_uuid(),
            attempts,
        })
    }

    /// Releases `lock`. A token that is no longer current is only logged.
    pub async fn release(&self, lock: PoolLock) {
        match self.store.release(&lock.key, &lock.token).await {
            Ok(true) => tracing::debug!(pool_id = %lock.pool_id, "pool lock released"),
            Ok(false) => tracing::warn!(
                pool_id = %lock.pool_id,
                token = %lock.token,
                "pool lock expired or taken over before release"
            ),
            Err(e) => tracing::warn!(pool_id = %lock.pool_id, error = %e, "pool lock release failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn manager(store: Arc<InMemoryLockStore>, max_retries: u32) -> PoolLockManager {
        PoolLockManager::new(
            store,
            LockConfig {
                ttl: Duration::from_secs(5),
                max_retries,
                retry_delay: Duration::from_millis(5),
            },
        )
    }

    #[test]
    fn key_uses_pool_prefix() {
        let id = PoolId::new();
        assert_eq!(PoolLockManager::lock_key(id), format!("ride_pool:{id}"));
    }

    #[tokio::test]
    async fn contended_lock_times_out_after_retries() {
        let store = Arc::new(InMemoryLockStore::new());
        let locks = manager(Arc::clone(&store), 2);
        let id = PoolId::new();

        let Ok(held) = locks.acquire(id).await else {
            panic!("first acquire failed");
        };
        let Err(err) = locks.acquire(id).await else {
            panic!("second acquire succeeded while held");
        };
        assert!(matches!(err, GatewayError::LockTimeout { attempts: 3, .. }));
        assert!(err.is_retryable());

        locks.release(held).await;
        assert!(locks.acquire(id).await.is_ok());
    }

    #[tokio::test]
    async fn different_pools_do_not_contend() {
        let locks = manager(Arc::new(InMemoryLockStore::new()), 0);
        let a = locks.acquire(PoolId::new()).await;
        let b = locks.acquire(PoolId::new()).await;
        assert!(a.is_ok());
        assert!(b.is_ok());
    }
}
