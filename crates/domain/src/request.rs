//! Buyer sourcing requests.

use chrono::{DateTime, Duration, Utc};
use common::{BidId, RequestId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// Persisted lifecycle of a request.
///
/// ```text
/// Open ──┬──► Fulfilled   (only via bid acceptance)
///        └──► Closed      (buyer closes without a winner)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Open,
    Closed,
    Fulfilled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Closed => "closed",
            RequestStatus::Fulfilled => "fulfilled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RequestStatus::Open),
            "closed" => Ok(RequestStatus::Closed),
            "fulfilled" => Ok(RequestStatus::Fulfilled),
            other => Err(DomainError::Invalid(format!("unknown request status: {other}"))),
        }
    }
}

/// Status shown to users; refines the persisted status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayStatus {
    Open,
    Bidding,
    BidAccepted,
    Closed,
    Expired,
}

/// Buyer input for a new request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub product_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub quantity: u32,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub target_price: Money,
    #[serde(default)]
    pub max_budget: Money,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A buyer's sourcing need that suppliers bid on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: RequestId,
    pub request_number: String,
    pub buyer_id: UserId,
    pub product_name: String,
    pub description: String,
    pub category: String,
    pub quantity: u32,
    pub unit: String,
    pub target_price: Money,
    pub max_budget: Money,
    pub status: RequestStatus,
    /// Advisory counter; may run high after a failed withdraw decrement.
    pub bid_count: u32,
    pub accepted_bid: Option<BidId>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Validates buyer input and opens a request.
    pub fn create(
        id: RequestId,
        buyer_id: UserId,
        input: NewRequest,
        default_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if input.product_name.trim().is_empty() {
            return Err(DomainError::MissingField {
                field: "productName",
            });
        }
        if input.quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                quantity: input.quantity,
            });
        }
        if input.target_price.is_negative() || input.max_budget.is_negative() {
            return Err(DomainError::Invalid(
                "targetPrice and maxBudget may not be negative".to_string(),
            ));
        }
        let expires_at = input.expires_at.unwrap_or(now + default_ttl);
        if expires_at <= now {
            return Err(DomainError::Invalid(
                "expiresAt must be in the future".to_string(),
            ));
        }

        Ok(Self {
            id,
            request_number: request_number(id, now),
            buyer_id,
            product_name: input.product_name.trim().to_string(),
            description: input.description,
            category: input.category,
            quantity: input.quantity,
            unit: input.unit,
            target_price: input.target_price,
            max_budget: input.max_budget,
            status: RequestStatus::Open,
            bid_count: 0,
            accepted_bid: None,
            accepted_at: None,
            expires_at,
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves a not-yet-stored request to a fresh id and matching number.
    pub fn renumber(&mut self, id: RequestId) {
        self.id = id;
        self.request_number = request_number(id, self.created_at);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Guard for bid creation: the request must be open and unexpired.
    pub fn ensure_accepts_bids(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != RequestStatus::Open {
            return Err(DomainError::InvalidTransition {
                entity: "request",
                from: self.status.to_string(),
                action: "receive bids",
            });
        }
        if self.is_expired(now) {
            return Err(DomainError::InvalidTransition {
                entity: "request",
                from: "expired".to_string(),
                action: "receive bids",
            });
        }
        Ok(())
    }

    /// Records the winning bid. Only an open request can be fulfilled.
    pub fn fulfill(&mut self, bid_id: BidId, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != RequestStatus::Open || self.accepted_bid.is_some() {
            return Err(DomainError::InvalidTransition {
                entity: "request",
                from: self.status.to_string(),
                action: "accept a bid",
            });
        }
        self.status = RequestStatus::Fulfilled;
        self.accepted_bid = Some(bid_id);
        self.accepted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Closes an open request without a winner.
    pub fn close(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != RequestStatus::Open {
            return Err(DomainError::InvalidTransition {
                entity: "request",
                from: self.status.to_string(),
                action: "close",
            });
        }
        self.status = RequestStatus::Closed;
        self.updated_at = now;
        Ok(())
    }

    pub fn display_status(&self, now: DateTime<Utc>) -> DisplayStatus {
        match self.status {
            RequestStatus::Fulfilled => DisplayStatus::BidAccepted,
            RequestStatus::Closed => DisplayStatus::Closed,
            RequestStatus::Open if self.is_expired(now) => DisplayStatus::Expired,
            RequestStatus::Open if self.bid_count > 0 => DisplayStatus::Bidding,
            RequestStatus::Open => DisplayStatus::Open,
        }
    }
}

/// Human-facing request number, e.g. `REQ-20261017-3FA85F`.
pub fn request_number(id: RequestId, now: DateTime<Utc>) -> String {
    format!("REQ-{}-{}", now.format("%Y%m%d"), short_code(id.as_uuid()))
}

pub(crate) fn short_code(uuid: uuid::Uuid) -> String {
    uuid.simple().to_string()[..6].to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewRequest {
        NewRequest {
            product_name: "Cotton tote bags".to_string(),
            quantity: 500,
            target_price: Money::from_cents(150),
            max_budget: Money::from_dollars(900),
            ..NewRequest::default()
        }
    }

    fn open_request(now: DateTime<Utc>) -> Request {
        Request::create(RequestId::new(), UserId::new(), input(), Duration::days(30), now).unwrap()
    }

    #[test]
    fn create_applies_default_ttl_and_number() {
        let now = Utc::now();
        let request = open_request(now);
        assert_eq!(request.status, RequestStatus::Open);
        assert_eq!(request.expires_at, now + Duration::days(30));
        assert!(request.request_number.starts_with("REQ-"));
        assert_eq!(request.request_number.len(), "REQ-20260101-ABCDEF".len());

        let mut renumbered = request.clone();
        let id = RequestId::new();
        renumbered.renumber(id);
        assert_eq!(renumbered.id, id);
        assert_eq!(renumbered.request_number, request_number(id, now));
    }

    #[test]
    fn create_rejects_invalid_input() {
        let now = Utc::now();
        let mut bad = input();
        bad.quantity = 0;
        assert!(Request::create(RequestId::new(), UserId::new(), bad, Duration::days(1), now).is_err());

        let mut past = input();
        past.expires_at = Some(now - Duration::hours(1));
        assert!(Request::create(RequestId::new(), UserId::new(), past, Duration::days(1), now).is_err());
    }

    #[test]
    fn expired_request_refuses_bids() {
        let now = Utc::now();
        let request = open_request(now);
        assert!(request.ensure_accepts_bids(now).is_ok());
        assert!(request.ensure_accepts_bids(request.expires_at).is_err());
        assert_eq!(request.display_status(request.expires_at), DisplayStatus::Expired);
    }

    #[test]
    fn fulfill_is_one_shot() {
        let now = Utc::now();
        let mut request = open_request(now);
        let bid = BidId::new();
        request.fulfill(bid, now).unwrap();
        assert_eq!(request.status, RequestStatus::Fulfilled);
        assert_eq!(request.accepted_bid, Some(bid));
        assert!(request.fulfill(BidId::new(), now).unwrap_err().is_transition());
        assert!(request.ensure_accepts_bids(now).is_err());
        assert_eq!(request.display_status(now), DisplayStatus::BidAccepted);
    }

    #[test]
    fn close_only_from_open() {
        let now = Utc::now();
        let mut request = open_request(now);
        request.close(now).unwrap();
        assert_eq!(request.status, RequestStatus::Closed);
        assert!(request.close(now).is_err());
        assert!(request.fulfill(BidId::new(), now).is_err());
    }

    #[test]
    fn display_status_reports_bidding() {
        let now = Utc::now();
        let mut request = open_request(now);
        assert_eq!(request.display_status(now), DisplayStatus::Open);
        request.bid_count = 2;
        assert_eq!(request.display_status(now), DisplayStatus::Bidding);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [RequestStatus::Open, RequestStatus::Closed, RequestStatus::Fulfilled] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
    }
}
