//! Domain events reflecting committed pool mutations.
//!
//! Every committed join or cancel emits a [`PoolEvent`] through the
//! [`super::EventBus`]. Events are logged and optionally appended to the
//! PostgreSQL event log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{PoolId, RequestId};

/// Domain event emitted after a versioned write succeeds.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A new pool was opened for a request nobody could share with.
    PoolCreated {
        /// Pool identifier.
        pool_id: PoolId,
        /// Founding request.
        request_id: RequestId,
        /// Founding passenger's fare.
        price: f64,
        /// Committed version.
        version: u64,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A request joined an existing pool.
    PassengerJoined {
        /// Pool identifier.
        pool_id: PoolId,
        /// Joining request.
        request_id: RequestId,
        /// Joining passenger's fare.
        price: f64,
        /// Route growth caused by the join.
        detour_fraction: f64,
        /// Confirmed passengers after the join.
        passenger_count: usize,
        /// Committed version.
        version: u64,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A passenger left a pool that still has riders.
    PassengerCancelled {
        /// Pool identifier.
        pool_id: PoolId,
        /// Cancelled request.
        request_id: RequestId,
        /// Confirmed passengers remaining.
        remaining_passengers: usize,
        /// Committed version.
        version: u64,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The last passenger left; the pool is closed.
    PoolCancelled {
        /// Pool identifier.
        pool_id: PoolId,
        /// Request whose cancellation emptied the pool.
        request_id: RequestId,
        /// Committed version.
        version: u64,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl PoolEvent {
    /// Returns the pool ID associated with this event.
    #[must_use]
    pub fn pool_id(&self) -> PoolId {
        match self {
            Self::PoolCreated { pool_id, .. }
            | Self::PassengerJoined { pool_id, .. }
            | Self::PassengerCancelled { pool_id, .. }
            | Self::PoolCancelled { pool_id, .. } => *pool_id,
        }
    }

    /// Returns the committed pool version carried by this event.
    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            Self::PoolCreated { version, .. }
            | Self::PassengerJoined { version, .. }
            | Self::PassengerCancelled { version, .. }
            | Self::PoolCancelled { version, .. } => *version,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::PoolCreated { .. } => "pool_created",
            Self::PassengerJoined { .. } => "passenger_joined",
            Self::PassengerCancelled { .. } => "passenger_cancelled",
            Self::PoolCancelled { .. } => "pool_cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passenger_joined_serializes_with_tag() {
        let event = PoolEvent::PassengerJoined {
            pool_id: PoolId::new(),
            request_id: RequestId::new(),
            price: 21.5,
            detour_fraction: 0.08,
            passenger_count: 2,
            version: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"passenger_joined\""));
        assert!(json.contains("21.5"));
        assert_eq!(event.version(), 2);
    }

    #[test]
    fn pool_id_accessor() {
        let id = PoolId::new();
        let event = PoolEvent::PoolCancelled {
            pool_id: id,
            request_id: RequestId::new(),
            version: 3,
            timestamp: Utc::now(),
        };
        assert_eq!(event.pool_id(), id);
        assert_eq!(event.event_type_str(), "pool_cancelled");
    }
}
