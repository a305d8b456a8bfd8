//! Money value object.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Largest unit price, tier price, bid price or absolute price modifier the
/// marketplace accepts ($10,000,000.00).
///
/// Bounding unit prices keeps every `unit * u32` line total inside `i64`.
pub const MAX_UNIT_PRICE: Money = Money::from_cents(1_000_000_000);

/// Money amount represented in cents to avoid floating point issues.
///
/// Serialized as a bare integer of minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole currency value.
    pub const fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, failing instead of wrapping.
    pub fn checked_multiply(&self, quantity: u32) -> Result<Money, DomainError> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
            .ok_or(DomainError::AmountOverflow)
    }

    /// Adds two amounts, failing instead of wrapping.
    pub fn checked_add(&self, rhs: Money) -> Result<Money, DomainError> {
        self.cents
            .checked_add(rhs.cents)
            .map(Money::from_cents)
            .ok_or(DomainError::AmountOverflow)
    }

    /// Subtracts `rhs`, failing instead of wrapping.
    pub fn checked_sub(&self, rhs: Money) -> Result<Money, DomainError> {
        self.cents
            .checked_sub(rhs.cents)
            .map(Money::from_cents)
            .ok_or(DomainError::AmountOverflow)
    }

    /// Sums amounts, failing on the first overflow.
    pub fn checked_sum<I>(amounts: I) -> Result<Money, DomainError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Returns true when `|self|` does not exceed [`MAX_UNIT_PRICE`].
    pub fn within_unit_bound(&self) -> bool {
        self.cents.unsigned_abs() <= MAX_UNIT_PRICE.cents.unsigned_abs()
    }

    /// Percentage discount of `self` relative to `original`, rounded to the
    /// nearest whole percent.
    ///
    /// Returns 0 when `original` is not positive. A price above the original
    /// yields a negative discount.
    pub fn discount_percent_from(&self, original: Money) -> i64 {
        if !original.is_positive() {
            return 0;
        }
        let ratio = (original.cents - self.cents) as f64 / original.cents as f64;
        (ratio * 100.0).round() as i64
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

// Operators saturate. Pricing paths that must not clamp use the checked_*
// methods above.
impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
