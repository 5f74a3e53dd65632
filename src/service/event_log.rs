//! Background task that logs pool events and appends them to storage.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::{EventBus, PoolEvent};
use crate::persistence::PostgresPersistence;

/// Subscribes to `event_bus` and, until every sender is gone, logs each
/// [`PoolEvent`] and appends it through `persistence` when one is given.
///
/// A failed append is logged and skipped; matching never waits on it.
#[must_use]
pub fn spawn_event_log(
    event_bus: &EventBus,
    persistence: Option<PostgresPersistence>,
) -> JoinHandle<u64> {
    let mut event_rx = event_bus.subscribe();
    tokio::spawn(async move {
        let mut seen = 0_u64;
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    seen += 1;
                    record(&event, persistence.as_ref()).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event log lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!(seen, "event log stopped");
        seen
    })
}

async fn record(event: &PoolEvent, persistence: Option<&PostgresPersistence>) {
    tracing::info!(
        event_type = event.event_type_str(),
        pool_id = %event.pool_id(),
        version = event.version(),
        "pool event"
    );
    if let Some(store) = persistence
        && let Err(e) = store.save_event(event).await
    {
        tracing::warn!(pool_id = %event.pool_id(), error = %e, "failed to append pool event");
    }
}
