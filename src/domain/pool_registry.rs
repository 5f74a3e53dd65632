//! In-memory pool arena with optimistic versioning.
//!
//! [`PoolRegistry`] keeps every pool in a `HashMap` keyed by [`PoolId`].
//! Readers receive owned clones; writers hand back a whole snapshot that
//! is accepted only if the stored version still matches.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ports::PoolRepository;
use super::ride_pool::{Load, PoolSummary, RidePool};
use super::{GeoPoint, PoolId};
use crate::error::GatewayError;

/// Arena of ride pools implementing [`PoolRepository`].
///
/// # Concurrency
///
/// The map lock is held only for the duration of a clone or a
/// compare-and-swap, never across an `.await` in callers. Lost updates are
/// prevented by the version check, not by holding the lock.
#[derive(Debug)]
pub struct PoolRegistry {
    pools: RwLock<HashMap<PoolId, RidePool>>,
}

impl PoolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of pools in the registry.
    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    /// Returns `true` if the registry contains no pools.
    pub async fn is_empty(&self) -> bool {
        self.pools.read().await.is_empty()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoolRepository for PoolRegistry {
    async fn find_nearby(
        &self,
        point: GeoPoint,
        radius_km: f64,
        min_seats: u32,
        min_luggage: u32,
    ) -> Result<Vec<PoolSummary>, GatewayError> {
        let need = Load::new(min_seats, min_luggage);
        let map = self.pools.read().await;
        let mut found: Vec<PoolSummary> = map
            .values()
            .filter(|pool| pool.matches_search(&point, radius_km, &need))
            .map(PoolSummary::from)
            .collect();
        // HashMap order is arbitrary; keep results stable for ranking ties.
        found.sort_by_key(|s| s.pool_id);
        Ok(found)
    }

    async fn load(&self, id: PoolId) -> Result<RidePool, GatewayError> {
        let map = self.pools.read().await;
        map.get(&id)
            .cloned()
            .ok_or(GatewayError::PoolNotFound(*id.as_uuid()))
    }

    async fn save(
        &self,
        mut pool: RidePool,
        expected_version: u64,
    ) -> Result<RidePool, GatewayError> {
        let mut map = self.pools.write().await;
        let stored_version = map.get(&pool.id).map(|p| p.version);
        match stored_version {
            None if expected_version != 0 => {
                return Err(GatewayError::PoolNotFound(*pool.id.as_uuid()));
            }
            Some(found) if found != expected_version => {
                return Err(GatewayError::ConcurrencyConflict {
                    pool_id: *pool.id.as_uuid(),
                    expected: expected_version,
                    found,
                });
            }
            _ => {}
        }
        pool.version = expected_version + 1;
        map.insert(pool.id, pool.clone());
        Ok(pool)
    }
}
