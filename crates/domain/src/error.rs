//! Domain error types.

use thiserror::Error;

/// Errors raised by pure domain rules.
///
/// None of these involve I/O. Services upstream translate them into the
/// validation/conflict taxonomy exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A quantity was zero or otherwise unusable.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// A price was not strictly positive.
    #[error("Invalid {field}: {cents} (must be greater than 0)")]
    InvalidPrice { field: &'static str, cents: i64 },

    /// Quantity below the minimum order quantity.
    #[error("Quantity {quantity} is below the minimum order quantity of {minimum}")]
    BelowMinimumOrder { quantity: u32, minimum: u32 },

    /// Quantity above the maximum order quantity.
    #[error("Quantity {quantity} exceeds the maximum order quantity of {maximum}")]
    AboveMaximumOrder { quantity: u32, maximum: u32 },

    /// Price tiers were not declared in ascending `min_qty` order.
    #[error("Price tiers must be sorted ascending by min_qty (tier {index} starts at {min_qty})")]
    UnsortedTiers { index: usize, min_qty: u32 },

    /// A single price tier is malformed.
    #[error("Invalid price tier {index}: {reason}")]
    InvalidTier { index: usize, reason: String },

    /// Two options share the same name.
    #[error("Duplicate option name: {name}")]
    DuplicateOption { name: String },

    /// The requested variant does not exist on the product.
    #[error("Unknown variant: {selector}")]
    UnknownVariant { selector: String },

    /// A state machine refused a transition.
    #[error("Invalid {entity} transition: cannot {action} from {from} state")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    /// Adding to a line would push its quantity past `u32::MAX`.
    #[error("Quantity {current} + {added} is too large")]
    QuantityOverflow { current: u32, added: u32 },

    /// A money amount left the representable range.
    #[error("Amount is too large")]
    AmountOverflow,

    /// An amount exceeded the per-unit ceiling.
    #[error("{field} must not exceed {max} cents (got {cents})")]
    PriceTooLarge {
        field: &'static str,
        cents: i64,
        max: i64,
    },

    /// Option values would expand into more variants than a product may hold.
    #[error("Options would generate {count} variants (maximum {max})")]
    TooManyVariants { count: usize, max: usize },

    /// A required field was missing or empty.
    #[error("{field} is required")]
    MissingField { field: &'static str },

    /// Any other input problem.
    #[error("{0}")]
    Invalid(String),
}

impl DomainError {
    /// Returns true when the error describes a refused state transition
    /// rather than bad input.
    pub fn is_transition(&self) -> bool {
        matches!(self, DomainError::InvalidTransition { .. })
    }
}
