//! Human-facing number allocation.
//!
//! Request and order numbers carry only six hex digits of the record id, so
//! two records created on the same day can collide. A candidate whose number
//! is already stored is moved to a fresh id before it is inserted. The check
//! runs inside the caller's unit of work; the unique index still backs it up.

use common::{OrderId, RequestId};
use domain::{Order, Request};
use store::UnitOfWork;

use crate::error::{Result, SagaError};

/// Fresh ids drawn before giving up.
const MAX_ATTEMPTS: usize = 8;

/// Gives `request` a number no stored request uses.
pub(crate) async fn assign_request_number(
    uow: &mut dyn UnitOfWork,
    request: &mut Request,
) -> Result<()> {
    for _ in 0..MAX_ATTEMPTS {
        if !uow.request_number_taken(&request.request_number).await? {
            return Ok(());
        }
        tracing::debug!(number = %request.request_number, "request number taken, drawing another");
        request.renumber(RequestId::new());
    }
    Err(SagaError::conflict("could not allocate a request number"))
}

/// Gives `order` a number no stored order uses.
pub(crate) async fn assign_order_number(uow: &mut dyn UnitOfWork, order: &mut Order) -> Result<()> {
    for _ in 0..MAX_ATTEMPTS {
        if !uow.order_number_taken(&order.order_number).await? {
            return Ok(());
        }
        tracing::debug!(number = %order.order_number, "order number taken, drawing another");
        order.renumber(OrderId::new());
    }
    Err(SagaError::conflict("could not allocate an order number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use common::{ProductId, UserId};
    use domain::{Money, NewRequest, OrderLine, PartySnapshot, VariantSelection};
    use store::{InMemoryMarketStore, MarketStore};

    fn request() -> Request {
        Request::create(
            RequestId::new(),
            UserId::new(),
            NewRequest {
                product_name: "Linen napkins".to_string(),
                quantity: 500,
                ..NewRequest::default()
            },
            Duration::days(30),
            Utc::now(),
        )
        .unwrap()
    }

    fn order() -> Order {
        let party = PartySnapshot {
            id: UserId::new(),
            name: "Nia".to_string(),
            email: "nia@example.com".to_string(),
        };
        Order::place(
            party.clone(),
            party,
            vec![OrderLine {
                product_id: ProductId::new(),
                product_title: "Napkin".to_string(),
                image: None,
                selection: VariantSelection::default(),
                quantity: 2,
                unit_price: Money::from_cents(150),
                total_price: Money::from_cents(300),
                bid_id: None,
                request_id: None,
                cart_item_id: None,
            }],
            None,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn colliding_request_number_is_redrawn() {
        let store = InMemoryMarketStore::new();
        let stored = request();
        let mut uow = store.begin().await.unwrap();
        uow.insert_request(&stored).await.unwrap();

        let mut candidate = request();
        candidate.request_number = stored.request_number.clone();
        let original_id = candidate.id;

        assign_request_number(uow.as_mut(), &mut candidate).await.unwrap();

        assert_ne!(candidate.request_number, stored.request_number);
        assert_ne!(candidate.id, original_id);
        uow.insert_request(&candidate).await.unwrap();
    }

    #[tokio::test]
    async fn free_number_is_kept() {
        let store = InMemoryMarketStore::new();
        let mut uow = store.begin().await.unwrap();
        let mut candidate = order();
        let before = candidate.clone();

        assign_order_number(uow.as_mut(), &mut candidate).await.unwrap();
        assert_eq!(candidate, before);
    }

    #[tokio::test]
    async fn colliding_order_number_is_redrawn() {
        let store = InMemoryMarketStore::new();
        let stored = order();
        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&stored).await.unwrap();

        let mut candidate = order();
        candidate.order_number = stored.order_number.clone();

        assign_order_number(uow.as_mut(), &mut candidate).await.unwrap();

        assert_ne!(candidate.order_number, stored.order_number);
        assert!(candidate.order_number.starts_with("ORD-"));
        uow.insert_order(&candidate).await.unwrap();
    }
}
