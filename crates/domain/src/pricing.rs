//! Quantity-banded unit pricing.
//!
//! A product declares an ordered list of [`PriceTier`]s. Resolution picks the
//! first tier, in declaration order, whose band contains the quantity, and
//! falls back to the base price otherwise. Overlapping bands are resolved by
//! that first-match rule rather than by tightest fit.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::{MAX_UNIT_PRICE, Money};

/// A quantity band with its own unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTier {
    /// Inclusive lower bound.
    pub min_qty: u32,

    /// Inclusive upper bound. `None` and `Some(0)` both mean unbounded.
    #[serde(default)]
    pub max_qty: Option<u32>,

    /// Unit price inside the band.
    pub price: Money,

    /// Display label, e.g. "100+ units".
    #[serde(default)]
    pub label: String,
}

impl PriceTier {
    /// Creates a bounded tier.
    pub fn bounded(min_qty: u32, max_qty: u32, price: Money) -> Self {
        Self {
            min_qty,
            max_qty: Some(max_qty),
            price,
            label: format!("{min_qty}-{max_qty}"),
        }
    }

    /// Creates a tier with no upper bound.
    pub fn open_ended(min_qty: u32, price: Money) -> Self {
        Self {
            min_qty,
            max_qty: None,
            price,
            label: format!("{min_qty}+"),
        }
    }

    /// Returns the effective upper bound; zero is treated as unbounded.
    pub fn upper_bound(&self) -> Option<u32> {
        self.max_qty.filter(|max| *max > 0)
    }

    /// Returns true if the quantity falls inside this band.
    pub fn contains(&self, quantity: u32) -> bool {
        quantity >= self.min_qty && self.upper_bound().is_none_or(|max| quantity <= max)
    }
}

/// Returns the first tier whose band contains `quantity`.
pub fn matching_tier(quantity: u32, tiers: &[PriceTier]) -> Option<&PriceTier> {
    tiers.iter().find(|tier| tier.contains(quantity))
}

/// Resolves the unit price for `quantity`.
///
/// Total over every input: with no matching tier (including an empty list or
/// a zero quantity below every band) the base price is returned.
pub fn resolve_unit_price(quantity: u32, tiers: &[PriceTier], base_price: Money) -> Money {
    matching_tier(quantity, tiers)
        .map(|tier| tier.price)
        .unwrap_or(base_price)
}

/// Checks the structural invariants of a tier list.
///
/// Tiers must be non-decreasing by `min_qty` and carry a positive price no
/// larger than [`MAX_UNIT_PRICE`]. A bounded tier may not end before it starts.
pub fn validate_tiers(tiers: &[PriceTier]) -> Result<(), DomainError> {
    for (index, tier) in tiers.iter().enumerate() {
        if !tier.price.is_positive() {
            return Err(DomainError::InvalidTier {
                index,
                reason: format!("price must be positive, got {}", tier.price.cents()),
            });
        }
        if tier.price > MAX_UNIT_PRICE {
            return Err(DomainError::InvalidTier {
                index,
                reason: format!(
                    "price must not exceed {}, got {}",
                    MAX_UNIT_PRICE.cents(),
                    tier.price.cents()
                ),
            });
        }
        if let Some(max) = tier.upper_bound()
            && max < tier.min_qty
        {
            return Err(DomainError::InvalidTier {
                index,
                reason: format!("max_qty {max} is below min_qty {}", tier.min_qty),
            });
        }
        if index > 0 && tier.min_qty < tiers[index - 1].min_qty {
            return Err(DomainError::UnsortedTiers {
                index,
                min_qty: tier.min_qty,
            });
        }
    }
    Ok(())
}
