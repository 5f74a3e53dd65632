//! Regions, time buckets, and an in-memory [`DemandSource`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::GeoPoint;
use super::geo::BoundingBox;
use super::ports::DemandSource;
use crate::error::GatewayError;

/// Live request and capacity counts for one region and bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Demand {
    /// Requests waiting for a ride.
    pub active_requests: u32,
    /// Free seats on offer.
    pub available_capacity: u32,
}

impl Demand {
    /// Creates a demand figure.
    #[must_use]
    pub const fn new(active_requests: u32, available_capacity: u32) -> Self {
        Self {
            active_requests,
            available_capacity,
        }
    }
}

/// A square grid cell on the lat/lng plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    lat_index: i64,
    lng_index: i64,
    cell_micro_deg: u64,
}

impl Region {
    /// The cell of side `cell_deg` degrees containing `point`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn containing(point: &GeoPoint, cell_deg: f64) -> Self {
        let cell_deg = if cell_deg.is_finite() && cell_deg > 0.0 {
            cell_deg
        } else {
            1.0
        };
        Self {
            lat_index: (point.lat / cell_deg).floor() as i64,
            lng_index: (point.lng / cell_deg).floor() as i64,
            cell_micro_deg: (cell_deg * 1e6).round() as u64,
        }
    }

    /// Cell side in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell_deg(&self) -> f64 {
        self.cell_micro_deg as f64 / 1e6
    }

    /// Edges of the cell.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> BoundingBox {
        let size = self.cell_deg();
        BoundingBox {
            min_lat: self.lat_index as f64 * size,
            max_lat: (self.lat_index + 1) as f64 * size,
            min_lng: self.lng_index as f64 * size,
            max_lng: (self.lng_index + 1) as f64 * size,
        }
    }

    /// Stable textual key, e.g. `"0.05:754:-2448"`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.cell_deg(), self.lat_index, self.lng_index)
    }
}

/// A fixed-width slice of wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBucket {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Width in minutes.
    pub minutes: u32,
}

impl TimeBucket {
    /// The bucket of width `minutes` containing `now`.
    #[must_use]
    pub fn containing(now: DateTime<Utc>, minutes: u32) -> Self {
        let minutes = minutes.max(1);
        let start = now
            .duration_trunc(Duration::minutes(i64::from(minutes)))
            .unwrap_or(now);
        Self { start, minutes }
    }

    /// Exclusive end.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(self.minutes))
    }
}

/// Demand figures held in memory, with a fallback for unseen cells.
#[derive(Debug)]
pub struct InMemoryDemandSource {
    default: Demand,
    entries: RwLock<HashMap<(Region, TimeBucket), Demand>>,
}

impl InMemoryDemandSource {
    /// Creates a source answering `default` until figures are recorded.
    #[must_use]
    pub fn new(default: Demand) -> Self {
        Self {
            default,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Records the figures for a region and bucket.
    pub async fn record(&self, region: Region, bucket: TimeBucket, demand: Demand) {
        self.entries.write().await.insert((region, bucket), demand);
    }
}

impl Default for InMemoryDemandSource {
    fn default() -> Self {
        Self::new(Demand::default())
    }
}

#[async_trait]
impl DemandSource for InMemoryDemandSource {
    async fn current_demand(
        &self,
        region: &Region,
        bucket: &TimeBucket,
    ) -> Result<Demand, GatewayError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(*region, *bucket))
            .copied()
            .unwrap_or(self.default))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    #[test]
    fn region_bounds_contain_the_point() {
        let p = GeoPoint::new(-122.3789, 37.6213);
        let region = Region::containing(&p, 0.05);
        assert!(region.bounds().contains(&p));
        assert_eq!(region, Region::containing(&GeoPoint::new(-122.37, 37.62), 0.05));
    }

    #[test]
    fn bucket_floors_to_width() {
        let now = Utc
            .with_ymd_and_hms(2024, 5, 2, 17, 43, 12)
            .single()
            .unwrap_or_default();
        let bucket = TimeBucket::containing(now, 15);
        assert_eq!(bucket.start.minute(), 30);
        assert_eq!(bucket.start.second(), 0);
        assert_eq!(bucket.end().minute(), 45);
    }

    #[tokio::test]
    async fn recorded_demand_overrides_default() {
        let source = InMemoryDemandSource::new(Demand::new(1, 10));
        let region = Region::containing(&GeoPoint::new(0.0, 0.0), 0.05);
        let bucket = TimeBucket::containing(Utc::now(), 15);

        let before = source.current_demand(&region, &bucket).await.ok();
        assert_eq!(before, Some(Demand::new(1, 10)));

        source.record(region, bucket, Demand::new(30, 10)).await;
        let after = source.current_demand(&region, &bucket).await.ok();
        assert_eq!(after, Some(Demand::new(30, 10)));
    }
}
