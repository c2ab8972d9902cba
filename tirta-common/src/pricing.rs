//! Tiered water pricing arithmetic
//!
//! Pure, stateless billing function consumed by the presentation layer.
//! Tiers are loaded fresh from configuration per calculation; nothing here
//! owns them.

use serde::{Deserialize, Serialize};

/// One band of the tiered tariff
///
/// Tiers use inclusive volume ranges: 0-10, 11-20, 21-unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    /// Lower bound of the band, cubic meters
    pub min_volume: f64,
    /// Upper bound of the band, cubic meters; None means unbounded
    pub max_volume: Option<f64>,
    /// Price per cubic meter within the band, Rupiah
    pub price_per_m3: f64,
}

/// Default PDAM-style tariff: 0-10 @ 3000, 11-20 @ 4500, 21+ @ 6000
pub fn default_tiers() -> Vec<PricingTier> {
    vec![
        PricingTier { min_volume: 0.0, max_volume: Some(10.0), price_per_m3: 3000.0 },
        PricingTier { min_volume: 11.0, max_volume: Some(20.0), price_per_m3: 4500.0 },
        PricingTier { min_volume: 21.0, max_volume: None, price_per_m3: 6000.0 },
    ]
}

/// Calculate the water cost for a consumed volume under a tiered tariff
///
/// For 49 m³ with tiers (0-10, 11-20, 21-∞): tier 1 charges 10 m³,
/// tier 2 charges 10 m³, tier 3 charges 29 m³. Result is rounded to the
/// nearest whole Rupiah.
pub fn water_cost(volume_m3: f64, tiers: &[PricingTier]) -> i64 {
    let mut sorted: Vec<&PricingTier> = tiers.iter().collect();
    sorted.sort_by(|a, b| a.min_volume.total_cmp(&b.min_volume));

    let mut total = 0.0;
    for tier in sorted {
        if volume_m3 < tier.min_volume {
            continue;
        }

        let tier_max = tier.max_volume.unwrap_or(f64::INFINITY);
        // Inclusive ranges: the first band starts at zero, every later band
        // effectively starts at the previous band's upper bound.
        let effective_min = if tier.min_volume == 0.0 {
            0.0
        } else {
            tier.min_volume - 1.0
        };

        let volume_in_tier = volume_m3.min(tier_max) - effective_min;
        if volume_in_tier > 0.0 {
            total += volume_in_tier * tier.price_per_m3;
        }
    }

    total.round() as i64
}
