//! In-process [`LockStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{LockStore, LockToken};
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy)]
struct Held {
    token: LockToken,
    expires_at: Instant,
}

/// Lock table guarded by a single mutex; expiry is checked lazily.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    held: Mutex<HashMap<String, Held>>,
}

impl InMemoryLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, GatewayError> {
        let now = Instant::now();
        let mut held = self.held.lock().await;
        if held.get(key).is_some_and(|h| h.expires_at > now) {
            return Ok(None);
        }
        let token = LockToken::new();
        held.insert(
            key.to_string(),
            Held {
                token,
                expires_at: now + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, GatewayError> {
        let mut held = self.held.lock().await;
        match held.get(key) {
            Some(h) if h.token == *token => {
                held.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
