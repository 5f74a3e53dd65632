//! Persistence layer: PostgreSQL stores behind the domain ports.
//!
//! Each store owns a cloned `sqlx::PgPool` and uses runtime-checked
//! queries. Aggregates are stored as JSONB documents next to the few
//! columns that queries filter on; [`models`] derives those columns.
//! Tables are expected to exist:
//!
//! ```sql
//! CREATE TABLE ride_pools (
//!     pool_id UUID PRIMARY KEY, status TEXT NOT NULL,
//!     origin_lat DOUBLE PRECISION, origin_lng DOUBLE PRECISION,
//!     free_seats BIGINT NOT NULL, free_luggage BIGINT NOT NULL,
//!     version BIGINT NOT NULL, body JSONB NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL);
//! CREATE TABLE ride_requests (
//!     request_id UUID PRIMARY KEY, requester TEXT NOT NULL, status TEXT NOT NULL,
//!     pickup_lat DOUBLE PRECISION NOT NULL, pickup_lng DOUBLE PRECISION NOT NULL,
//!     matched_pool_id UUID, created_at TIMESTAMPTZ NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL, body JSONB NOT NULL);
//! CREATE TABLE pool_events (
//!     id BIGSERIAL PRIMARY KEY, pool_id UUID NOT NULL, event_type TEXT NOT NULL,
//!     version BIGINT NOT NULL, payload JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now());
//! CREATE TABLE pool_locks (
//!     lock_key TEXT PRIMARY KEY, token UUID NOT NULL, expires_at TIMESTAMPTZ NOT NULL);
//! ```

pub mod demand_source;
pub mod models;
pub mod pool_repository;
pub mod postgres;
pub mod request_repository;

pub use demand_source::PostgresDemandSource;
pub use pool_repository::PostgresPoolRepository;
pub use postgres::PostgresPersistence;
pub use request_repository::PostgresRequestRepository;
