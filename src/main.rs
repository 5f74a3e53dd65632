//! ridepool-gateway server entry point.
//!
//! Wires the matching core to in-memory or PostgreSQL stores and starts
//! the Axum HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use ridepool_gateway::api;
use ridepool_gateway::app_state::AppState;
use ridepool_gateway::config::GatewayConfig;
use ridepool_gateway::domain::{
    Clock, DemandSource, EventBus, InMemoryDemandSource, PoolRegistry, PoolRepository,
    RequestRegistry, RequestRepository, SystemClock,
};
use ridepool_gateway::lock::{InMemoryLockStore, LockStore, PostgresLockStore};
use ridepool_gateway::persistence::{
    PostgresDemandSource, PostgresPersistence, PostgresPoolRepository, PostgresRequestRepository,
};
use ridepool_gateway::service::{MatchingCoordinator, spawn_event_log};

/// Storage backends selected at startup.
struct Stores {
    pools: Arc<dyn PoolRepository>,
    requests: Arc<dyn RequestRepository>,
    demand: Arc<dyn DemandSource>,
    locks: Arc<dyn LockStore>,
    event_log: Option<PostgresPersistence>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; LOG_FORMAT=json switches to structured output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    tracing::info!(
        addr = %config.listen_addr,
        persistence = config.persistence_enabled,
        ranking = %config.settings.matching.ranking,
        pricing = %config.settings.pricing.strategy,
        "starting ridepool-gateway"
    );

    let stores = if config.persistence_enabled {
        postgres_stores(&config)
            .await
            .context("connecting to PostgreSQL")?
    } else {
        memory_stores()
    };

    let event_bus = EventBus::new(config.event_bus_capacity);
    let _event_log = spawn_event_log(&event_bus, stores.event_log);

    let coordinator = MatchingCoordinator::new(
        stores.pools,
        stores.requests,
        stores.demand,
        stores.locks,
        Arc::new(SystemClock) as Arc<dyn Clock>,
        event_bus,
        config.settings.clone(),
    );
    let app = api::build_app(
        AppState::new(coordinator),
        Duration::from_secs(config.request_timeout_secs),
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

fn memory_stores() -> Stores {
    Stores {
        pools: Arc::new(PoolRegistry::new()),
        requests: Arc::new(RequestRegistry::new()),
        demand: Arc::new(InMemoryDemandSource::default()),
        locks: Arc::new(InMemoryLockStore::new()),
        event_log: None,
    }
}

async fn postgres_stores(config: &GatewayConfig) -> Result<Stores, sqlx::Error> {
    let pg = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    Ok(Stores {
        pools: Arc::new(PostgresPoolRepository::new(pg.clone())),
        requests: Arc::new(PostgresRequestRepository::new(pg.clone())),
        demand: Arc::new(PostgresDemandSource::new(pg.clone())),
        locks: Arc::new(PostgresLockStore::new(pg.clone())),
        event_log: config
            .event_log_enabled
            .then(|| PostgresPersistence::new(pg)),
    })
}
