//! Minimal-detour insertion of a pickup/dropoff pair into a route.

use crate::config::RouteConfig;
use crate::domain::ride_pool::{Stop, reindex_stops};
use crate::domain::geo::haversine_km;

/// Best insertion found by [`RouteOptimizer::detour`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detour {
    /// `(new - original) / original` route length.
    pub detour_fraction: f64,
    /// Route with the new stops inserted, sequence numbers reindexed.
    pub route: Vec<Stop>,
    /// Length of `route` in kilometers.
    pub total_distance_km: f64,
    /// Position of the new pickup in `route`.
    pub pickup_index: usize,
    /// Position of the new dropoff in `route`.
    pub dropoff_index: usize,
}

/// Great-circle route arithmetic.
#[derive(Debug, Clone)]
pub struct RouteOptimizer {
    avg_speed_kmh: f64,
}

impl RouteOptimizer {
    /// Creates an optimizer using the configured average speed.
    #[must_use]
    pub fn new(config: &RouteConfig) -> Self {
        Self {
            avg_speed_kmh: config.avg_speed_kmh,
        }
    }

    /// Sum of consecutive leg distances in kilometers.
    #[must_use]
    pub fn route_distance(stops: &[Stop]) -> f64 {
        stops
            .windows(2)
            .map(|leg| match leg {
                [a, b] => haversine_km(&a.location, &b.location),
                _ => 0.0,
            })
            .sum()
    }

    /// Driving minutes for `distance_km`, rounded up.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn estimate_duration(&self, distance_km: f64) -> u32 {
        if distance_km <= 0.0 || self.avg_speed_kmh <= 0.0 {
            return 0;
        }
        (distance_km * 60.0 / self.avg_speed_kmh).ceil() as u32
    }

    /// Tries every pickup position `p ∈ [0, n]` and dropoff position
    /// `d ∈ [p, n]` and keeps the shortest resulting route. Earlier `p`,
    /// then earlier `d`, wins ties.
    #[must_use]
    pub fn detour(&self, stops: &[Stop], pickup: &Stop, dropoff: &Stop) -> Detour {
        if stops.is_empty() {
            let mut route = vec![pickup.clone(), dropoff.clone()];
            reindex_stops(&mut route);
            return Detour {
                detour_fraction: 0.0,
                total_distance_km: haversine_km(&pickup.location, &dropoff.location),
                route,
                pickup_index: 0,
                dropoff_index: 1,
            };
        }

        let n = stops.len();
        let original = Self::route_distance(stops);
        let mut best: Option<(f64, usize, usize)> = None;

        for p in 0..=n {
            for d in p..=n {
                let distance = Self::route_distance(&splice(stops, pickup, dropoff, p, d));
                if best.is_none_or(|(best_distance, _, _)| distance < best_distance) {
                    best = Some((distance, p, d));
                }
            }
        }

        let (total_distance_km, p, d) = best.unwrap_or((original, n, n));
        let mut route = splice(stops, pickup, dropoff, p, d);
        reindex_stops(&mut route);

        Detour {
            detour_fraction: detour_fraction(original, total_distance_km),
            route,
            total_distance_km,
            pickup_index: p,
            dropoff_index: d + 1,
        }
    }
}

/// `stops[..p] + pickup + stops[p..d] + dropoff + stops[d..]`.
fn splice(stops: &[Stop], pickup: &Stop, dropoff: &Stop, p: usize, d: usize) -> Vec<Stop> {
    let mut route = Vec::with_capacity(stops.len() + 2);
    route.extend(stops.iter().take(p).cloned());
    route.push(pickup.clone());
    route.extend(stops.iter().skip(p).take(d - p).cloned());
    route.push(dropoff.clone());
    route.extend(stops.iter().skip(d).cloned());
    route
}

/// Relative growth; a zero-length original only tolerates zero growth.
fn detour_fraction(original: f64, new: f64) -> f64 {
    if original > 0.0 {
        (new - original) / original
    } else if new > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}
