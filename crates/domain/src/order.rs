//! Orders and their fulfilment state machine.

use chrono::{DateTime, Utc};
use common::{BidId, CartItemId, OrderId, ProductId, RequestId};
use serde::{Deserialize, Serialize};

use crate::actor::PartySnapshot;
use crate::error::DomainError;
use crate::money::Money;
use crate::product::VariantSelection;
use crate::request::short_code;

/// The fulfilment state of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The single forward step allowed from this state, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        match target {
            OrderStatus::Cancelled => self.can_cancel(),
            other => self.next() == Some(other),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "reopen",
            OrderStatus::Confirmed => "confirm",
            OrderStatus::Processing => "process",
            OrderStatus::Shipped => "ship",
            OrderStatus::Delivered => "deliver",
            OrderStatus::Cancelled => "cancel",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::Invalid(format!("unknown order status: {other}"))),
        }
    }
}

/// Payment state, driven by the external payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        matches!(
            (self, target),
            (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Failed, PaymentStatus::Paid)
                | (PaymentStatus::Paid, PaymentStatus::Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::Invalid(format!("unknown payment status: {other}"))),
        }
    }
}

/// A priced line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_title: String,
    pub image: Option<String>,
    pub selection: VariantSelection,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    /// Set when the line was bought at an accepted bid's price.
    pub bid_id: Option<BidId>,
    pub request_id: Option<RequestId>,
    /// Cart line this came from, for checkout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_item_id: Option<CartItemId>,
}

impl OrderLine {
    pub fn is_bulk_order(&self) -> bool {
        self.bid_id.is_some()
    }
}

/// An order between one buyer and one supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub buyer: PartySnapshot,
    pub supplier: PartySnapshot,
    pub products: Vec<OrderLine>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Assembles a pending order; the total is the sum of line totals.
    pub fn place(
        buyer: PartySnapshot,
        supplier: PartySnapshot,
        products: Vec<OrderLine>,
        shipping_address: Option<String>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if products.is_empty() {
            return Err(DomainError::Invalid(
                "an order needs at least one product".to_string(),
            ));
        }
        let id = OrderId::new();
        let total_amount = Money::checked_sum(products.iter().map(|line| line.total_price))?;
        Ok(Self {
            id,
            order_number: order_number(id, now),
            buyer,
            supplier,
            products,
            total_amount,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            shipping_address,
            notes,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn transition(&mut self, target: OrderStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidTransition {
                entity: "order",
                from: self.status.to_string(),
                action: target.verb(),
            });
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_payment_status(
        &mut self,
        target: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.payment_status.can_transition_to(target) {
            return Err(DomainError::InvalidTransition {
                entity: "payment",
                from: self.payment_status.to_string(),
                action: "update payment",
            });
        }
        self.payment_status = target;
        self.updated_at = now;
        Ok(())
    }

    pub fn total_quantity(&self) -> u32 {
        self.products
            .iter()
            .fold(0u32, |total, line| total.saturating_add(line.quantity))
    }

    /// Moves a not-yet-stored order to a fresh id and matching number.
    pub fn renumber(&mut self, id: OrderId) {
        self.id = id;
        self.order_number = order_number(id, self.created_at);
    }
}

/// Human-facing order number, e.g. `ORD-20261017-9C1D2E`.
pub fn order_number(id: OrderId, now: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", now.format("%Y%m%d"), short_code(id.as_uuid()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;

    fn party(name: &str) -> PartySnapshot {
        PartySnapshot {
            id: UserId::new(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
        }
    }

    fn line(quantity: u32, cents: i64) -> OrderLine {
        OrderLine {
            product_id: ProductId::new(),
            product_title: "Tote bag".to_string(),
            image: None,
            selection: VariantSelection::default(),
            quantity,
            unit_price: Money::from_cents(cents),
            total_price: Money::from_cents(cents * i64::from(quantity)),
            bid_id: None,
            request_id: None,
            cart_item_id: None,
        }
    }

    fn order() -> Order {
        Order::place(
            party("Buyer"),
            party("Supplier"),
            vec![line(10, 250), line(5, 100)],
            Some("1 Harbour St".to_string()),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn place_sums_line_totals() {
        let order = order();
        assert_eq!(order.total_amount, Money::from_cents(3_000));
        assert_eq!(order.total_quantity(), 15);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.order_number.starts_with("ORD-"));
    }

    #[test]
    fn place_rejects_empty_orders() {
        assert!(Order::place(party("B"), party("S"), vec![], None, None, Utc::now()).is_err());
    }

    #[test]
    fn place_rejects_totals_that_overflow() {
        let mut huge = line(1, 1);
        huge.total_price = Money::from_cents(i64::MAX);
        let result = Order::place(
            party("B"),
            party("S"),
            vec![huge, line(1, 1)],
            None,
            None,
            Utc::now(),
        );
        assert_eq!(result, Err(DomainError::AmountOverflow));
    }

    #[test]
    fn renumber_follows_the_new_id() {
        let mut order = order();
        let before = order.order_number.clone();
        let id = OrderId::new();
        order.renumber(id);
        assert_eq!(order.id, id);
        assert_eq!(order.order_number, order_number(id, order.created_at));
        assert_ne!(order.order_number, before);
        assert_eq!(&order.order_number[..12], &before[..12]);
    }

    #[test]
    fn fulfilment_moves_one_step_at_a_time() {
        let mut order = order();
        let now = Utc::now();
        assert!(order.transition(OrderStatus::Shipped, now).is_err());
        for step in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            order.transition(step, now).unwrap();
        }
        assert!(order.status.is_terminal());
        assert!(order.transition(OrderStatus::Cancelled, now).is_err());
    }

    #[test]
    fn cancel_only_before_processing() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Confirmed.can_cancel());
        assert!(!OrderStatus::Processing.can_cancel());

        let mut order = order();
        order.transition(OrderStatus::Confirmed, Utc::now()).unwrap();
        order.transition(OrderStatus::Processing, Utc::now()).unwrap();
        let err = order.transition(OrderStatus::Cancelled, Utc::now()).unwrap_err();
        assert!(err.is_transition());
    }

    #[test]
    fn payment_does_not_follow_delivery() {
        let mut order = order();
        order.set_payment_status(PaymentStatus::Paid, Utc::now()).unwrap();
        assert!(order.set_payment_status(PaymentStatus::Failed, Utc::now()).is_err());
        order.set_payment_status(PaymentStatus::Refunded, Utc::now()).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn status_parses_from_wire_names() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
        assert_eq!("paid".parse::<PaymentStatus>().unwrap(), PaymentStatus::Paid);
    }
}
