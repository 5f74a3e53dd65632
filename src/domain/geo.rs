//! Geographic points and great-circle distance.
//!
//! Points use GeoJSON axis order on the wire: `[lng, lat]` in degrees.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Mean Earth radius in kilometers used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers spanned by one degree of latitude.
const KM_PER_DEGREE_LAT: f64 = 111.32;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    /// Longitude in degrees, `[-180, 180]`.
    pub lng: f64,
    /// Latitude in degrees, `[-90, 90]`.
    pub lat: f64,
}

impl GeoPoint {
    /// Creates a point from longitude and latitude.
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Rejects non-finite or out-of-range coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Validation`] naming the offending `field`.
    pub fn validate(&self, field: &str) -> Result<(), GatewayError> {
        if !self.lng.is_finite() || !self.lat.is_finite() {
            return Err(GatewayError::Validation(format!(
                "{field}: coordinates must be finite"
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(GatewayError::Validation(format!(
                "{field}: longitude {} out of range",
                self.lng
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(GatewayError::Validation(format!(
                "{field}: latitude {} out of range",
                self.lat
            )));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in kilometers.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(self, other)
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(point: GeoPoint) -> Self {
        [point.lng, point.lat]
    }
}

/// Haversine distance between two points in kilometers.
///
/// Returns exactly `0.0` for identical coordinates.
#[must_use]
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Axis-aligned box in degrees, used to prefilter radius queries.
///
/// A box that crosses the antimeridian has `min_lng > max_lng` and covers
/// `min_lng..=180` plus `-180..=max_lng`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lng: f64,
    /// Eastern edge.
    pub max_lng: f64,
}

impl BoundingBox {
    /// Smallest box containing every point within `radius_km` of `center`.
    ///
    /// Near the poles the longitude span widens to the full range. Edges
    /// past ±180 wrap around to the other side.
    #[must_use]
    pub fn around(center: &GeoPoint, radius_km: f64) -> Self {
        let dlat = radius_km / KM_PER_DEGREE_LAT;
        let cos_lat = center.lat.to_radians().cos();
        let dlng = if cos_lat.abs() < 1e-6 {
            180.0
        } else {
            radius_km / (KM_PER_DEGREE_LAT * cos_lat.abs())
        };
        let (min_lng, max_lng) = if dlng >= 180.0 {
            (-180.0, 180.0)
        } else {
            (wrap_lng(center.lng - dlng), wrap_lng(center.lng + dlng))
        };
        Self {
            min_lat: (center.lat - dlat).max(-90.0),
            max_lat: (center.lat + dlat).min(90.0),
            min_lng,
            max_lng,
        }
    }

    /// Whether the box spans the antimeridian.
    #[must_use]
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lng > self.max_lng
    }

    /// Longitude intervals covered by the box. Both entries are equal unless
    /// the box crosses the antimeridian.
    #[must_use]
    pub fn lng_ranges(&self) -> [(f64, f64); 2] {
        if self.crosses_antimeridian() {
            [(self.min_lng, 180.0), (-180.0, self.max_lng)]
        } else {
            [(self.min_lng, self.max_lng); 2]
        }
    }

    /// Returns `true` if `point` lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && self
                .lng_ranges()
                .iter()
                .any(|(lo, hi)| (*lo..=*hi).contains(&point.lng))
    }
}

/// Maps a longitude up to one turn outside `-180..=180` back into range.
fn wrap_lng(lng: f64) -> f64 {
    if lng < -180.0 {
        lng + 360.0
    } else if lng > 180.0 {
        lng - 360.0
    } else {
        lng
    }
}
