//! Order reads and post-placement transitions.

use chrono::Utc;
use common::OrderId;
use domain::{Actor, Order, OrderStatus, PaymentStatus, Role};
use store::{MarketStore, MarketStoreExt, OrderFilter};

use crate::error::{Result, SagaError};

#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S: MarketStore + Clone> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Orders where the caller is the buyer or the supplier, newest first.
    pub async fn list_orders(&self, actor: &Actor, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let filter = match actor.role {
            Role::Buyer => OrderFilter::for_buyer(actor.user_id),
            Role::Supplier => OrderFilter::for_supplier(actor.user_id),
        };
        let filter = match status {
            Some(status) => filter.status(status),
            None => filter,
        };
        Ok(self.store.orders(filter).await?)
    }

    pub async fn get_order(&self, actor: &Actor, id: OrderId) -> Result<Order> {
        let order = self
            .store
            .order(id)
            .await?
            .ok_or_else(|| SagaError::not_found("order", id))?;
        ensure_party(&order, actor)?;
        Ok(order)
    }

    /// Moves an order along its lifecycle.
    ///
    /// The supplier advances the order; either party may cancel while it is
    /// pending or confirmed, which puts the stock back.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        id: OrderId,
        target: OrderStatus,
    ) -> Result<Order> {
        let mut uow = self.store.begin().await?;
        let mut order = uow
            .get_order(id)
            .await?
            .ok_or_else(|| SagaError::not_found("order", id))?;
        ensure_party(&order, actor)?;
        if target != OrderStatus::Cancelled && order.supplier.id != actor.user_id {
            return Err(SagaError::forbidden("only the supplier can advance an order"));
        }

        let previous = order.status;
        order.transition(target, Utc::now())?;
        uow.update_order(&order, previous, order.payment_status).await?;

        if target == OrderStatus::Cancelled {
            for line in &order.products {
                uow.restore_availability(line.product_id, line.quantity).await?;
            }
            tracing::info!(order_id = %order.id, lines = order.products.len(), "order cancelled, stock restored");
        }
        uow.commit().await?;
        Ok(order)
    }

    /// Records a payment outcome reported by either party.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn update_payment(
        &self,
        actor: &Actor,
        id: OrderId,
        target: PaymentStatus,
    ) -> Result<Order> {
        let mut uow = self.store.begin().await?;
        let mut order = uow
            .get_order(id)
            .await?
            .ok_or_else(|| SagaError::not_found("order", id))?;
        ensure_party(&order, actor)?;

        let previous = order.payment_status;
        order.set_payment_status(target, Utc::now())?;
        uow.update_order(&order, order.status, previous).await?;
        uow.commit().await?;
        Ok(order)
    }
}

fn ensure_party(order: &Order, actor: &Actor) -> Result<()> {
    if order.buyer.id == actor.user_id || order.supplier.id == actor.user_id {
        Ok(())
    } else {
        Err(SagaError::forbidden("not a party to this order"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ProductId, UserId};
    use domain::{
        ExpansionDefaults, Money, NewProduct, OrderLine, PartySnapshot, Product,
        VariantSelection,
    };
    use store::InMemoryMarketStore;

    struct Fixture {
        store: InMemoryMarketStore,
        service: OrderService<InMemoryMarketStore>,
        buyer: Actor,
        supplier: Actor,
        product: Product,
        order: Order,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryMarketStore::new();
        let buyer = Actor::buyer(UserId::new(), "b@example.com");
        let supplier = Actor::supplier(UserId::new(), "s@example.com");
        let now = Utc::now();
        let mut product = Product::create(
            ProductId::new(),
            supplier.user_id,
            NewProduct {
                title: "Jute rug".to_string(),
                price: Money::from_dollars(40),
                available: Some(50),
                ..NewProduct::default()
            },
            ExpansionDefaults::default(),
            now,
        )
        .unwrap();
        // The order below already took 10 units.
        product.available = 40;
        product.sold = 10;

        let party = |actor: &Actor| PartySnapshot {
            id: actor.user_id,
            name: actor.email.clone(),
            email: actor.email.clone(),
        };
        let order = Order::place(
            party(&buyer),
            party(&supplier),
            vec![OrderLine {
                product_id: product.id,
                product_title: product.title.clone(),
                image: None,
                selection: VariantSelection::default(),
                quantity: 10,
                unit_price: Money::from_dollars(40),
                total_price: Money::from_dollars(400),
                bid_id: None,
                request_id: None,
                cart_item_id: None,
            }],
            None,
            None,
            now,
        )
        .unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.save_product(&product).await.unwrap();
        uow.insert_order(&order).await.unwrap();
        uow.commit().await.unwrap();

        Fixture {
            service: OrderService::new(store.clone()),
            store,
            buyer,
            supplier,
            product,
            order,
        }
    }

    #[tokio::test]
    async fn only_parties_can_read() {
        let f = fixture().await;
        let stranger = Actor::buyer(UserId::new(), "x@example.com");

        assert_eq!(f.service.get_order(&f.buyer, f.order.id).await.unwrap(), f.order);
        assert_eq!(f.service.list_orders(&f.supplier, None).await.unwrap().len(), 1);
        assert!(matches!(
            f.service.get_order(&stranger, f.order.id).await,
            Err(SagaError::Forbidden(_))
        ));
        assert!(f.service.list_orders(&stranger, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn supplier_advances_and_buyer_cannot() {
        let f = fixture().await;
        assert!(matches!(
            f.service
                .update_status(&f.buyer, f.order.id, OrderStatus::Confirmed)
                .await,
            Err(SagaError::Forbidden(_))
        ));

        let confirmed = f
            .service
            .update_status(&f.supplier, f.order.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Confirmed);

        let err = f
            .service
            .update_status(&f.supplier, f.order.id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn cancel_restores_stock() {
        let f = fixture().await;
        f.service
            .update_status(&f.buyer, f.order.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let product = f.store.product(f.product.id).await.unwrap().unwrap();
        assert_eq!(product.available, 50);
        assert_eq!(product.sold, 0);

        let err = f
            .service
            .update_status(&f.supplier, f.order.id, OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn delivery_leaves_payment_alone() {
        let f = fixture().await;
        for step in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            f.service
                .update_status(&f.supplier, f.order.id, step)
                .await
                .unwrap();
        }
        let order = f.service.get_order(&f.buyer, f.order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.payment_status, PaymentStatus::Pending);

        let paid = f
            .service
            .update_payment(&f.buyer, f.order.id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert!(
            f.service
                .update_payment(&f.buyer, f.order.id, PaymentStatus::Failed)
                .await
                .unwrap_err()
                .is_conflict()
        );
    }
}
