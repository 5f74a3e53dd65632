//! Data Transfer Objects for REST request/response serialization.
//!
//! Coordinates travel as GeoJSON-ordered `[lng, lat]` pairs. Identifiers
//! are plain UUIDs on the wire.

pub mod pool_dto;
pub mod ride_dto;

pub use pool_dto::*;
pub use ride_dto::*;
