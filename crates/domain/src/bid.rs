//! Supplier bids and their state machine.

use chrono::{DateTime, Utc};
use common::{BidId, ProductId, RequestId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;
use crate::product::check_price;

/// The state of a bid.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Accepted
///           ├──► Rejected
///           └──► Withdrawn
/// ```
/// Every state other than `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl BidStatus {
    /// Returns true if the bid may move to `target`.
    pub fn can_transition_to(&self, target: BidStatus) -> bool {
        matches!(self, BidStatus::Pending) && !matches!(target, BidStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BidStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Pending => "pending",
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
            BidStatus::Withdrawn => "withdrawn",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            BidStatus::Pending => "reopen",
            BidStatus::Accepted => "accept",
            BidStatus::Rejected => "reject",
            BidStatus::Withdrawn => "withdraw",
        }
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BidStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BidStatus::Pending),
            "accepted" => Ok(BidStatus::Accepted),
            "rejected" => Ok(BidStatus::Rejected),
            "withdrawn" => Ok(BidStatus::Withdrawn),
            other => Err(DomainError::Invalid(format!("unknown bid status: {other}"))),
        }
    }
}

/// Supplier input for a new bid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBid {
    pub request_id: RequestId,
    pub product_id: ProductId,
    pub bid_price: Money,
    pub quantity: u32,
    pub delivery_time_days: u32,
    #[serde(default)]
    pub message: String,
}

impl NewBid {
    /// Checks the input fields; request/product guards live elsewhere.
    pub fn validate(&self) -> Result<(), DomainError> {
        check_price("bidPrice", self.bid_price)?;
        if self.quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                quantity: self.quantity,
            });
        }
        if self.delivery_time_days == 0 {
            return Err(DomainError::Invalid(
                "deliveryTimeDays must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A supplier's offer against a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub request_id: RequestId,
    pub supplier_id: UserId,
    pub supplier_name: String,
    pub product_id: ProductId,
    pub product_title: String,
    pub bid_price: Money,
    /// Product price at bid time, kept for discount provenance.
    pub original_price: Money,
    pub quantity: u32,
    pub delivery_time_days: u32,
    pub message: String,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
}

impl Bid {
    /// Moves the bid out of `Pending`, stamping the matching timestamp.
    pub fn transition(&mut self, target: BidStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidTransition {
                entity: "bid",
                from: self.status.to_string(),
                action: target.verb(),
            });
        }
        self.status = target;
        match target {
            BidStatus::Accepted => self.accepted_at = Some(now),
            BidStatus::Rejected => self.rejected_at = Some(now),
            BidStatus::Withdrawn => self.withdrawn_at = Some(now),
            BidStatus::Pending => {}
        }
        Ok(())
    }

    pub fn total_price(&self) -> Result<Money, DomainError> {
        self.bid_price.checked_multiply(self.quantity)
    }

    /// Discount of the bid price against the original price snapshot.
    pub fn discount_percent(&self) -> i64 {
        self.bid_price.discount_percent_from(self.original_price)
    }
}
