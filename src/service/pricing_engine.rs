//! Per-passenger fares: base fare, surge, pooling discount, fairness cap.
//!
//! All figures are in the fare currency's major unit. Quotes are rounded to
//! the cent; the fairness cap rounds each redistributed share *down* so the
//! pool total never ends above the cap.

use crate::config::{PricingConfig, PricingStrategy};
use crate::domain::ride_pool::MAX_FAIRNESS_CAP;
use crate::domain::{Demand, PoolPassenger, RidePool};

/// Largest pooling discount, reached at four riders.
const MAX_POOLING_DISCOUNT: f64 = 0.45;
/// Smallest pooling discount, whatever the detour.
const MIN_POOLING_DISCOUNT: f64 = 0.10;
/// Discount gained per additional rider.
const DISCOUNT_PER_RIDER: f64 = 0.15;
/// Discount lost per unit of detour fraction.
const DETOUR_PENALTY: f64 = 0.3;

/// Full breakdown of one passenger's fare.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    /// `max(km×rate + min×rate + fee, minimum)`.
    pub base_price: f64,
    /// Demand × time-of-day multiplier.
    pub surge_factor: f64,
    /// Fraction taken off for sharing.
    pub pooling_discount: f64,
    /// Fare without the pooling discount.
    pub solo_price: f64,
    /// Fare with every factor applied.
    pub price: f64,
}

/// Input to the fairness cap: what a rider pays and would pay alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fare {
    /// Fare without the pooling discount.
    pub solo_price: f64,
    /// Current fare.
    pub price: f64,
}

impl From<&PoolPassenger> for Fare {
    fn from(p: &PoolPassenger) -> Self {
        Self {
            solo_price: p.solo_price,
            price: p.price,
        }
    }
}

/// What a quote depends on beyond the trip itself.
#[derive(Debug, Clone, Copy)]
pub struct QuoteContext {
    /// Live demand in the pickup's region.
    pub demand: Demand,
    /// UTC hour of day, `0..24`.
    pub hour: u32,
    /// Confirmed riders in the pool including this one.
    pub pool_size: usize,
    /// Route growth this rider caused.
    pub detour_fraction: f64,
}

/// Stateless fare calculator.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    /// Creates an engine with the given rates and strategy. The fairness
    /// cap is clamped to `0..=MAX_FAIRNESS_CAP`.
    #[must_use]
    pub fn new(config: &PricingConfig) -> Self {
        let mut config = config.clone();
        config.fairness_cap = config.fairness_cap.clamp(0.0, MAX_FAIRNESS_CAP);
        Self { config }
    }

    /// Active pricing strategy.
    #[must_use]
    pub const fn strategy(&self) -> PricingStrategy {
        self.config.strategy
    }

    /// Distance plus time plus flat fee, floored at the minimum fare.
    #[must_use]
    pub fn base_price(&self, distance_km: f64, duration_min: f64) -> f64 {
        let fare = distance_km * self.config.rate_per_km
            + duration_min * self.config.rate_per_min
            + self.config.airport_fee;
        fare.max(self.config.minimum_fare)
    }

    /// Surge band for the ratio of active requests to free capacity.
    #[must_use]
    pub fn demand_multiplier(&self, active_requests: u32, available_capacity: u32) -> f64 {
        if available_capacity == 0 {
            return if active_requests > 0 { 2.5 } else { 1.0 };
        }
        let ratio = f64::from(active_requests) / f64::from(available_capacity);
        match ratio {
            r if r < 0.5 => 1.0,
            r if r < 1.0 => 1.2,
            r if r < 1.5 => 1.5,
            r if r < 2.0 => 2.0,
            _ => 2.5,
        }
    }

    /// Rush-hour and night multipliers.
    #[must_use]
    pub const fn time_multiplier(&self, hour: u32) -> f64 {
        match hour {
            6..=8 => 1.3,
            17..=19 => 1.4,
            0..=5 => 1.2,
            _ => 1.0,
        }
    }

    /// Sharing discount, shrinking with the detour a rider causes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pooling_discount(&self, pool_size: usize, detour_fraction: f64) -> f64 {
        let extra_riders = pool_size.saturating_sub(1) as f64;
        let sharing = (extra_riders * DISCOUNT_PER_RIDER).min(MAX_POOLING_DISCOUNT);
        (sharing - detour_fraction * DETOUR_PENALTY).max(MIN_POOLING_DISCOUNT)
    }

    /// Long-trip discount.
    #[must_use]
    pub fn distance_discount(&self, distance_km: f64) -> f64 {
        if distance_km > 50.0 {
            0.85
        } else if distance_km > 20.0 {
            0.90
        } else {
            1.0
        }
    }

    /// Prices one passenger's direct trip.
    #[must_use]
    pub fn quote(&self, distance_km: f64, duration_min: f64, ctx: &QuoteContext) -> Quote {
        let base_price = self.base_price(distance_km, duration_min);
        let surge_factor = match self.config.strategy {
            PricingStrategy::Dynamic => {
                self.demand_multiplier(ctx.demand.active_requests, ctx.demand.available_capacity)
                    * self.time_multiplier(ctx.hour)
            }
            PricingStrategy::Standard => 1.0,
        };
        let pooling_discount = self.pooling_discount(ctx.pool_size, ctx.detour_fraction);
        let solo = base_price * surge_factor * self.distance_discount(distance_km);

        Quote {
            base_price,
            surge_factor,
            pooling_discount,
            solo_price: round2(solo),
            price: round2(solo * (1.0 - pooling_discount)),
        }
    }

    /// Caps the pool total at `fairness_cap × Σ solo`.
    ///
    /// Under the cap the prices come back unchanged. Over it, the cap is
    /// split in proportion to each rider's solo fare and every share is
    /// floored to the cent.
    #[must_use]
    pub fn ensure_fair_pricing(&self, fares: &[Fare], total_pool_price: f64) -> Vec<f64> {
        let solo_total: f64 = fares.iter().map(|f| f.solo_price).sum();
        let cap = self.config.fairness_cap * solo_total;

        if total_pool_price <= cap {
            return fares.iter().map(|f| f.price).collect();
        }
        if solo_total <= 0.0 {
            return vec![0.0; fares.len()];
        }
        fares
            .iter()
            .map(|f| floor2(cap * f.solo_price / solo_total))
            .collect()
    }

    /// Re-applies the fairness cap to the pool's confirmed passengers and
    /// refreshes the pricing total.
    pub fn rebalance(&self, pool: &mut RidePool) {
        let fares: Vec<Fare> = pool.confirmed_passengers().map(Fare::from).collect();
        let total: f64 = fares.iter().map(|f| f.price).sum();
        let adjusted = self.ensure_fair_pricing(&fares, total);

        for (passenger, price) in pool
            .passengers
            .iter_mut()
            .filter(|p| p.is_confirmed())
            .zip(adjusted)
        {
            passenger.price = price;
        }
        pool.pricing.total_price = round2(pool.confirmed_passengers().map(|p| p.price).sum());
    }
}

/// Rounds half away from zero to two decimals.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn floor2(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}
