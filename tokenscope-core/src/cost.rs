//! Cost model
//!
//! [`cost`] is a pure function from a token tally and a pricing tier to a
//! dollar amount. Rounding is a presentation concern and is deliberately
//! not part of it: per-session costs are rounded to 4 decimal places when
//! stored on a [`SessionSummary`](crate::types::SessionSummary), aggregate
//! totals to 2 when placed into the report. The sum of rounded per-session
//! costs may therefore differ slightly from the rounded total; the two
//! paths are intentionally not reconciled.

use crate::types::TokenTally;
use serde::{Deserialize, Serialize};

/// Cached reads bill at 10% of the input rate (90% discount).
pub const CACHE_READ_DISCOUNT: f64 = 0.10;
/// Cache writes bill at 125% of the input rate (25% premium).
pub const CACHE_CREATION_PREMIUM: f64 = 1.25;

/// Per-million-token prices for one model tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    /// Tier name used for selection ("sonnet", "opus", ...)
    pub name: String,
    /// Dollars per million input tokens
    pub input_per_mtok: f64,
    /// Dollars per million output tokens
    pub output_per_mtok: f64,
}

impl PricingTier {
    pub fn new(name: impl Into<String>, input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            name: name.into(),
            input_per_mtok,
            output_per_mtok,
        }
    }

    /// The built-in tier table: two high-capability tiers and one low-cost
    /// tier. Config may extend or override it.
    pub fn builtin() -> Vec<PricingTier> {
        vec![
            PricingTier::new("opus", 15.0, 75.0),
            PricingTier::new("sonnet", 3.0, 15.0),
            PricingTier::new("haiku", 0.80, 4.0),
        ]
    }

    /// Look up a tier by name.
    pub fn by_name<'a>(tiers: &'a [PricingTier], name: &str) -> Option<&'a PricingTier> {
        tiers.iter().find(|t| t.name == name)
    }
}

/// Cost of a tally at one tier, split into its billing components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostComponents {
    /// Input billed at the full rate (input minus cache reads, floored at 0)
    pub regular_input: f64,
    /// Output at the output rate
    pub output: f64,
    /// Cache reads at the discounted input rate
    pub cache_read: f64,
    /// Cache writes at the premium input rate
    pub cache_creation: f64,
    /// Sum of the four components
    pub total: f64,
}

/// Compute the cost of `tally` at `tier`, broken into components.
pub fn cost_components(tally: &TokenTally, tier: &PricingTier) -> CostComponents {
    let regular_input_tokens = tally.input.saturating_sub(tally.cache_read);

    let regular_input = regular_input_tokens as f64 / 1e6 * tier.input_per_mtok;
    let output = tally.output as f64 / 1e6 * tier.output_per_mtok;
    let cache_read = tally.cache_read as f64 / 1e6 * tier.input_per_mtok * CACHE_READ_DISCOUNT;
    let cache_creation =
        tally.cache_creation as f64 / 1e6 * tier.input_per_mtok * CACHE_CREATION_PREMIUM;

    CostComponents {
        regular_input,
        output,
        cache_read,
        cache_creation,
        total: regular_input + output + cache_read + cache_creation,
    }
}

/// Compute the cost of `tally` at `tier`. Unrounded.
pub fn cost(tally: &TokenTally, tier: &PricingTier) -> f64 {
    cost_components(tally, tier).total
}

/// Round to 2 decimal places (report totals).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to 4 decimal places (per-session costs).
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Round to 1 decimal place (percentages).
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
