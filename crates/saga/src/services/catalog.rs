//! Catalog: products, tier quotes and variant stock.

use chrono::Utc;
use common::ProductId;
use domain::{
    Actor, NewProduct, PriceQuote, Product, ProductUpdate, Role, UpdateReport, VariantSelection,
};
use store::{MarketStore, MarketStoreExt, ProductFilter};

use crate::error::{Result, SagaError};
use crate::services::require_role;
use crate::settings::MarketSettings;

#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
    settings: MarketSettings,
}

impl<S: MarketStore + Clone> CatalogService<S> {
    pub fn new(store: S, settings: MarketSettings) -> Self {
        Self { store, settings }
    }

    /// Creates a product and persists its generated variants.
    #[tracing::instrument(skip(self, input), fields(supplier_id = %actor.user_id))]
    pub async fn create_product(&self, actor: &Actor, input: NewProduct) -> Result<Product> {
        require_role(actor, Role::Supplier, "list products")?;
        let product = Product::create(
            ProductId::new(),
            actor.user_id,
            input,
            self.settings.expansion,
            Utc::now(),
        )?;

        let mut uow = self.store.begin().await?;
        uow.save_product(&product).await?;
        uow.commit().await?;

        metrics::counter!("variants_generated_total").increment(product.variants.len() as u64);
        tracing::info!(
            product_id = %product.id,
            variants = product.variants.len(),
            "product created"
        );
        Ok(product)
    }

    /// Applies an owner's partial update, regenerating variants when options
    /// or the base price changed.
    #[tracing::instrument(skip(self, update), fields(user_id = %actor.user_id))]
    pub async fn update_product(
        &self,
        actor: &Actor,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<(Product, UpdateReport)> {
        require_role(actor, Role::Supplier, "edit products")?;

        let mut uow = self.store.begin().await?;
        let mut product = uow
            .lock_product(id)
            .await?
            .ok_or_else(|| SagaError::not_found("product", id))?;
        if product.supplier_id != actor.user_id {
            return Err(SagaError::forbidden("only the owning supplier can edit this product"));
        }

        let report = product.apply_update(update, self.settings.expansion, Utc::now())?;
        uow.save_product(&product).await?;
        uow.commit().await?;

        if report.variants_regenerated {
            metrics::counter!("variants_generated_total")
                .increment(product.variants.len() as u64);
        }
        if report.discarded_manual_stock {
            tracing::warn!(product_id = %id, "variant regeneration discarded manual stock");
        }
        Ok((product, report))
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .product(id)
            .await?
            .ok_or_else(|| SagaError::not_found("product", id))
    }

    pub async fn list_products(&self, filter: ProductFilter) -> Result<Vec<Product>> {
        Ok(self.store.products(filter).await?)
    }

    /// Prices `quantity` units against the current tier table.
    pub async fn quote(
        &self,
        id: ProductId,
        quantity: u32,
        selection: &VariantSelection,
    ) -> Result<PriceQuote> {
        if quantity == 0 {
            return Err(SagaError::Validation("quantity must be greater than 0".to_string()));
        }
        let product = self.get_product(id).await?;
        Ok(product.quote(quantity, selection)?)
    }

    /// Overrides one variant's stock until the next regeneration.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn set_variant_stock(
        &self,
        actor: &Actor,
        id: ProductId,
        sku: &str,
        stock: u32,
    ) -> Result<Product> {
        require_role(actor, Role::Supplier, "edit stock")?;

        let mut uow = self.store.begin().await?;
        let mut product = uow
            .lock_product(id)
            .await?
            .ok_or_else(|| SagaError::not_found("product", id))?;
        if product.supplier_id != actor.user_id {
            return Err(SagaError::forbidden("only the owning supplier can edit stock"));
        }
        product.set_variant_stock(sku, stock, Utc::now())?;
        uow.save_product(&product).await?;
        uow.commit().await?;
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;
    use domain::{Money, OptionValue, PriceTier, VariantOption};
    use store::InMemoryMarketStore;

    fn service() -> CatalogService<InMemoryMarketStore> {
        CatalogService::new(InMemoryMarketStore::new(), MarketSettings::new(30, 250))
    }

    fn input() -> NewProduct {
        NewProduct {
            title: "Linen napkin".to_string(),
            price: Money::from_cents(200),
            price_tiers: vec![
                PriceTier::bounded(1, 99, Money::from_cents(200)),
                PriceTier::open_ended(100, Money::from_cents(150)),
            ],
            options: vec![VariantOption::new(
                "Color",
                vec![
                    OptionValue::new("Sand", Money::zero()),
                    OptionValue::new("Rust", Money::from_cents(10)),
                ],
            )],
            ..NewProduct::default()
        }
    }

    #[tokio::test]
    async fn buyers_cannot_create_products() {
        let service = service();
        let buyer = Actor::buyer(UserId::new(), "b@example.com");
        let err = service.create_product(&buyer, input()).await.unwrap_err();
        assert!(matches!(err, SagaError::Forbidden(_)));
    }

    #[tokio::test]
    async fn create_uses_configured_variant_stock() {
        let service = service();
        let supplier = Actor::supplier(UserId::new(), "s@example.com");
        let product = service.create_product(&supplier, input()).await.unwrap();

        assert_eq!(product.variants.len(), 2);
        assert!(product.variants.iter().all(|v| v.stock == 250));
        assert_eq!(product.available, 500);
        assert_eq!(service.get_product(product.id).await.unwrap(), product);
    }

    #[tokio::test]
    async fn only_the_owner_updates() {
        let service = service();
        let owner = Actor::supplier(UserId::new(), "s@example.com");
        let rival = Actor::supplier(UserId::new(), "r@example.com");
        let product = service.create_product(&owner, input()).await.unwrap();

        let err = service
            .update_product(&rival, product.id, ProductUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Forbidden(_)));
    }

    #[tokio::test]
    async fn update_reports_discarded_stock() {
        let service = service();
        let owner = Actor::supplier(UserId::new(), "s@example.com");
        let product = service.create_product(&owner, input()).await.unwrap();
        service
            .set_variant_stock(&owner, product.id, "SKU_1", 3)
            .await
            .unwrap();

        let (updated, report) = service
            .update_product(
                &owner,
                product.id,
                ProductUpdate {
                    price: Some(Money::from_cents(220)),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap();

        assert!(report.variants_regenerated);
        assert!(report.discarded_manual_stock);
        assert_eq!(updated.variant("SKU_1").unwrap().price.cents(), 230);
    }

    #[tokio::test]
    async fn quote_follows_tiers() {
        let service = service();
        let owner = Actor::supplier(UserId::new(), "s@example.com");
        let product = service.create_product(&owner, input()).await.unwrap();

        let quote = service
            .quote(product.id, 100, &VariantSelection::sku("SKU_1"))
            .await
            .unwrap();
        assert_eq!(quote.unit_price.cents(), 160);
        assert!(service.quote(product.id, 0, &VariantSelection::default()).await.is_err());
    }

    #[tokio::test]
    async fn oversized_inputs_are_validation_errors() {
        let service = service();
        let owner = Actor::supplier(UserId::new(), "s@example.com");

        let values: Vec<OptionValue> = (0..10)
            .map(|i| OptionValue::new(format!("v{i}"), Money::zero()))
            .collect();
        let mut exploding = input();
        exploding.options = (0..8)
            .map(|i| VariantOption::new(format!("opt{i}"), values.clone()))
            .collect();
        let err = service.create_product(&owner, exploding).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);

        let mut pricey = input();
        pricey.price = Money::from_cents(5_000_000_000);
        pricey.price_tiers.clear();
        let err = service.create_product(&owner, pricey).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn quote_at_max_quantity_does_not_overflow() {
        let service = service();
        let owner = Actor::supplier(UserId::new(), "s@example.com");
        let product = service.create_product(&owner, input()).await.unwrap();

        let quote = service
            .quote(product.id, u32::MAX, &VariantSelection::default())
            .await
            .unwrap();
        assert_eq!(quote.total_price.cents(), 150 * i64::from(u32::MAX));
    }
}
