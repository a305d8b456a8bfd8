//! Catalog products.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::{MAX_UNIT_PRICE, Money};
use crate::pricing::{PriceTier, matching_tier, resolve_unit_price, validate_tiers};
use crate::variants::{
    ExpansionDefaults, Variant, VariantOption, expand_variants, regenerate, validate_options,
};

/// Variant selectors supplied by a buyer.
///
/// `sku` wins when present; otherwise the attribute selectors are matched
/// against the product's generated variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSelection {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

impl VariantSelection {
    /// Selects a variant by SKU.
    pub fn sku(sku: impl Into<String>) -> Self {
        Self {
            sku: Some(sku.into()),
            ..Self::default()
        }
    }

    /// Returns true if no selector is set.
    pub fn is_empty(&self) -> bool {
        self.sku.is_none() && self.attribute_selectors().next().is_none()
    }

    fn attribute_selectors(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("color", self.color.as_deref()),
            ("size", self.size.as_deref()),
            ("material", self.material.as_deref()),
            ("style", self.style.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }

    fn matches(&self, variant: &Variant) -> bool {
        self.attribute_selectors().all(|(name, wanted)| {
            variant
                .attribute(name)
                .is_some_and(|actual| actual.eq_ignore_ascii_case(wanted))
        })
    }

    fn describe(&self) -> String {
        if let Some(sku) = &self.sku {
            return sku.clone();
        }
        self.attribute_selectors()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Fills in the SKU and attribute selectors from a resolved variant.
    pub fn normalized_for(&self, variant: &Variant) -> Self {
        let pick = |name: &str, current: &Option<String>| {
            variant
                .attribute(name)
                .map(str::to_string)
                .or_else(|| current.clone())
        };
        Self {
            sku: Some(variant.sku.clone()),
            color: pick("color", &self.color),
            size: pick("size", &self.size),
            material: pick("material", &self.material),
            style: pick("style", &self.style),
        }
    }
}

/// Supplier input for a new product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub unit: String,
    pub price: Money,
    #[serde(default)]
    pub original_price: Option<Money>,
    #[serde(default)]
    pub price_tiers: Vec<PriceTier>,
    #[serde(default)]
    pub options: Vec<VariantOption>,
    /// Total stock; defaults to the sum of generated variant stock.
    #[serde(default)]
    pub available: Option<u32>,
    #[serde(default)]
    pub moq: Option<u32>,
    /// Overrides the default stock of every generated variant.
    #[serde(default)]
    pub variant_stock: Option<u32>,
}

/// Partial update of a product. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
    pub unit: Option<String>,
    pub price: Option<Money>,
    pub original_price: Option<Money>,
    pub price_tiers: Option<Vec<PriceTier>>,
    pub options: Option<Vec<VariantOption>>,
    pub available: Option<u32>,
    pub moq: Option<u32>,
    pub variant_stock: Option<u32>,
}

/// What an update did to the materialized variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub variants_regenerated: bool,
    pub discarded_manual_stock: bool,
}

/// Unit price quote for a quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub tier_label: Option<String>,
    pub sku: Option<String>,
}

/// A supplier's catalog product with its materialized variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub supplier_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub images: Vec<String>,
    pub unit: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub price_tiers: Vec<PriceTier>,
    pub options: Vec<VariantOption>,
    pub variants: Vec<Variant>,
    pub available: u32,
    pub sold: u32,
    pub moq: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Validates supplier input and materializes the variant list.
    pub fn create(
        id: ProductId,
        supplier_id: UserId,
        input: NewProduct,
        defaults: ExpansionDefaults,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if input.title.trim().is_empty() {
            return Err(DomainError::MissingField { field: "title" });
        }
        check_price("price", input.price)?;
        validate_tiers(&input.price_tiers)?;
        validate_options(&input.options)?;
        let moq = input.moq.unwrap_or(1);
        if moq == 0 {
            return Err(DomainError::InvalidQuantity { quantity: moq });
        }

        let defaults = input
            .variant_stock
            .map(|stock| ExpansionDefaults { stock, ..defaults })
            .unwrap_or(defaults);
        let variants = expand_variants(&input.options, input.price, defaults)?;
        let available = input.available.unwrap_or_else(|| {
            variants
                .iter()
                .fold(0u32, |total, v| total.saturating_add(v.stock))
        });

        Ok(Self {
            id,
            supplier_id,
            title: input.title.trim().to_string(),
            description: input.description,
            category: input.category,
            images: input.images,
            unit: input.unit,
            price: input.price,
            original_price: input.original_price,
            price_tiers: input.price_tiers,
            options: input.options,
            variants,
            available,
            sold: 0,
            moq,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a partial update.
    ///
    /// Any change to `options` or `price` replaces the whole variant list;
    /// manual stock on the old variants is lost and reported.
    pub fn apply_update(
        &mut self,
        update: ProductUpdate,
        defaults: ExpansionDefaults,
        now: DateTime<Utc>,
    ) -> Result<UpdateReport, DomainError> {
        if let Some(price) = update.price {
            check_price("price", price)?;
        }
        if let Some(tiers) = &update.price_tiers {
            validate_tiers(tiers)?;
        }
        if let Some(options) = &update.options {
            validate_options(options)?;
        }
        if update.moq == Some(0) {
            return Err(DomainError::InvalidQuantity { quantity: 0 });
        }
        if let Some(title) = &update.title
            && title.trim().is_empty()
        {
            return Err(DomainError::MissingField { field: "title" });
        }

        let regenerate_variants = update.options.as_ref().is_some_and(|o| *o != self.options)
            || update.price.is_some_and(|p| p != self.price)
            || update.variant_stock.is_some();

        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(images) = update.images {
            self.images = images;
        }
        if let Some(unit) = update.unit {
            self.unit = unit;
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if update.original_price.is_some() {
            self.original_price = update.original_price;
        }
        if let Some(tiers) = update.price_tiers {
            self.price_tiers = tiers;
        }
        if let Some(options) = update.options {
            self.options = options;
        }
        if let Some(moq) = update.moq {
            self.moq = moq;
        }

        let mut report = UpdateReport::default();
        if regenerate_variants {
            let defaults = update
                .variant_stock
                .map(|stock| ExpansionDefaults { stock, ..defaults })
                .unwrap_or(defaults);
            let regeneration = regenerate(&self.variants, &self.options, self.price, defaults)?;
            self.variants = regeneration.variants;
            report = UpdateReport {
                variants_regenerated: true,
                discarded_manual_stock: regeneration.discarded_manual_stock,
            };
        }
        if let Some(available) = update.available {
            self.available = available;
        }

        self.updated_at = now;
        Ok(report)
    }

    /// Looks up a variant by SKU.
    pub fn variant(&self, sku: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.sku == sku)
    }

    /// Resolves buyer selectors to a variant.
    ///
    /// Returns `Ok(None)` for an empty selection, which buys the product at
    /// product level.
    pub fn find_variant(&self, selection: &VariantSelection) -> Result<Option<&Variant>, DomainError> {
        if selection.is_empty() {
            return Ok(None);
        }
        let unknown = || DomainError::UnknownVariant {
            selector: selection.describe(),
        };
        if let Some(sku) = &selection.sku {
            return self.variant(sku).map(Some).ok_or_else(unknown);
        }
        self.variants
            .iter()
            .find(|v| selection.matches(v))
            .map(Some)
            .ok_or_else(unknown)
    }

    /// Unit price for `quantity`, optionally for a specific variant.
    ///
    /// The tier table is resolved afresh on every call. A variant adds its
    /// modifier delta (`variant.price - price`) on top of the resolved tier.
    pub fn unit_price_for(
        &self,
        quantity: u32,
        variant: Option<&Variant>,
    ) -> Result<Money, DomainError> {
        let tier_price = resolve_unit_price(quantity, &self.price_tiers, self.price);
        match variant {
            Some(v) => tier_price.checked_add(v.price.checked_sub(self.price)?),
            None => Ok(tier_price),
        }
    }

    /// Unit price and line total for `quantity`.
    pub fn line_price(
        &self,
        quantity: u32,
        variant: Option<&Variant>,
    ) -> Result<(Money, Money), DomainError> {
        let unit_price = self.unit_price_for(quantity, variant)?;
        Ok((unit_price, unit_price.checked_multiply(quantity)?))
    }

    /// Builds a price quote for display.
    pub fn quote(
        &self,
        quantity: u32,
        selection: &VariantSelection,
    ) -> Result<PriceQuote, DomainError> {
        let variant = self.find_variant(selection)?;
        let (unit_price, total_price) = self.line_price(quantity, variant)?;
        Ok(PriceQuote {
            product_id: self.id,
            quantity,
            unit_price,
            total_price,
            tier_label: matching_tier(quantity, &self.price_tiers).map(|t| t.label.clone()),
            sku: variant.map(|v| v.sku.clone()),
        })
    }

    /// Checks quantity against MOQ and current availability.
    ///
    /// Returns `Ok(false)` when the quantity is valid but stock is short.
    pub fn check_order_quantity(&self, quantity: u32) -> Result<bool, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity });
        }
        if quantity < self.moq {
            return Err(DomainError::BelowMinimumOrder {
                quantity,
                minimum: self.moq,
            });
        }
        Ok(quantity <= self.available)
    }

    /// Overrides the stock of one variant.
    ///
    /// The value survives only until the next regeneration.
    pub fn set_variant_stock(
        &mut self,
        sku: &str,
        stock: u32,
        now: DateTime<Utc>,
    ) -> Result<&Variant, DomainError> {
        let variant = self
            .variants
            .iter_mut()
            .find(|v| v.sku == sku)
            .ok_or_else(|| DomainError::UnknownVariant {
                selector: sku.to_string(),
            })?;
        variant.stock = stock;
        self.updated_at = now;
        Ok(variant)
    }

    /// First image URL, used for snapshots.
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// Requires a positive unit price no larger than [`MAX_UNIT_PRICE`].
pub(crate) fn check_price(field: &'static str, price: Money) -> Result<(), DomainError> {
    if !price.is_positive() {
        return Err(DomainError::InvalidPrice {
            field,
            cents: price.cents(),
        });
    }
    if price > MAX_UNIT_PRICE {
        return Err(DomainError::PriceTooLarge {
            field,
            cents: price.cents(),
            max: MAX_UNIT_PRICE.cents(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::{DEFAULT_VARIANT_STOCK, OptionValue};

    fn shirt_input() -> NewProduct {
        NewProduct {
            title: "Polo shirt".to_string(),
            price: Money::from_cents(500),
            price_tiers: vec![
                PriceTier::bounded(1, 99, Money::from_cents(500)),
                PriceTier::open_ended(100, Money::from_cents(400)),
            ],
            options: vec![
                VariantOption::new(
                    "Color",
                    vec![
                        OptionValue::new("Red", Money::zero()),
                        OptionValue::new("Blue", Money::from_cents(20)),
                    ],
                ),
                VariantOption::new(
                    "Size",
                    vec![
                        OptionValue::new("S", Money::zero()),
                        OptionValue::new("M", Money::from_cents(10)),
                    ],
                ),
            ],
            moq: Some(10),
            ..NewProduct::default()
        }
    }

    fn shirt() -> Product {
        Product::create(
            ProductId::new(),
            UserId::new(),
            shirt_input(),
            ExpansionDefaults::default(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_materializes_variants_and_available() {
        let product = shirt();
        assert_eq!(product.variants.len(), 4);
        assert_eq!(product.available, 4 * DEFAULT_VARIANT_STOCK);
        assert_eq!(product.moq, 10);
        assert_eq!(product.sold, 0);
    }

    #[test]
    fn create_honours_explicit_available_and_variant_stock() {
        let mut input = shirt_input();
        input.available = Some(250);
        input.variant_stock = Some(50);
        let product = Product::create(
            ProductId::new(),
            UserId::new(),
            input,
            ExpansionDefaults::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(product.available, 250);
        assert!(product.variants.iter().all(|v| v.stock == 50));
    }

    #[test]
    fn create_rejects_bad_input() {
        let mut input = shirt_input();
        input.title = " ".to_string();
        assert!(matches!(
            Product::create(ProductId::new(), UserId::new(), input, ExpansionDefaults::default(), Utc::now()),
            Err(DomainError::MissingField { field: "title" })
        ));

        let mut input = shirt_input();
        input.price_tiers.reverse();
        assert!(matches!(
            Product::create(ProductId::new(), UserId::new(), input, ExpansionDefaults::default(), Utc::now()),
            Err(DomainError::UnsortedTiers { .. })
        ));

        let mut input = shirt_input();
        input.price = Money::zero();
        assert!(matches!(
            Product::create(ProductId::new(), UserId::new(), input, ExpansionDefaults::default(), Utc::now()),
            Err(DomainError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn unit_price_adds_variant_delta_to_tier() {
        let product = shirt();
        let blue_m = product.variant("SKU_3").unwrap();
        assert_eq!(product.unit_price_for(50, None).unwrap().cents(), 500);
        assert_eq!(product.unit_price_for(150, None).unwrap().cents(), 400);
        assert_eq!(product.unit_price_for(150, Some(blue_m)).unwrap().cents(), 430);
    }

    #[test]
    fn find_variant_by_sku_or_attributes() {
        let product = shirt();

        let by_sku = product.find_variant(&VariantSelection::sku("SKU_1")).unwrap();
        assert_eq!(by_sku.unwrap().sku, "SKU_1");

        let by_attrs = product
            .find_variant(&VariantSelection {
                color: Some("blue".to_string()),
                size: Some("S".to_string()),
                ..VariantSelection::default()
            })
            .unwrap();
        assert_eq!(by_attrs.unwrap().sku, "SKU_2");

        assert!(product.find_variant(&VariantSelection::default()).unwrap().is_none());
        assert!(matches!(
            product.find_variant(&VariantSelection::sku("SKU_9")),
            Err(DomainError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn normalized_selection_carries_sku_and_attributes() {
        let product = shirt();
        let selection = VariantSelection {
            color: Some("Red".to_string()),
            size: Some("M".to_string()),
            ..VariantSelection::default()
        };
        let variant = product.find_variant(&selection).unwrap().unwrap();
        let normalized = selection.normalized_for(variant);
        assert_eq!(normalized.sku.as_deref(), Some("SKU_1"));
        assert_eq!(normalized.color.as_deref(), Some("Red"));
        assert_eq!(normalized.size.as_deref(), Some("M"));
    }

    #[test]
    fn quote_reports_tier_label() {
        let product = shirt();
        let quote = product.quote(120, &VariantSelection::sku("SKU_0")).unwrap();
        assert_eq!(quote.unit_price.cents(), 400);
        assert_eq!(quote.total_price.cents(), 48_000);
        assert_eq!(quote.tier_label.as_deref(), Some("100+"));
        assert_eq!(quote.sku.as_deref(), Some("SKU_0"));
    }

    #[test]
    fn price_change_regenerates_variants() {
        let mut product = shirt();
        product.set_variant_stock("SKU_0", 5, Utc::now()).unwrap();

        let report = product
            .apply_update(
                ProductUpdate {
                    price: Some(Money::from_cents(600)),
                    ..ProductUpdate::default()
                },
                ExpansionDefaults::default(),
                Utc::now(),
            )
            .unwrap();

        assert!(report.variants_regenerated);
        assert!(report.discarded_manual_stock);
        assert_eq!(product.variants[0].price.cents(), 600);
        assert_eq!(product.variants[0].stock, DEFAULT_VARIANT_STOCK);
    }

    #[test]
    fn cosmetic_update_keeps_variants() {
        let mut product = shirt();
        product.set_variant_stock("SKU_0", 5, Utc::now()).unwrap();

        let report = product
            .apply_update(
                ProductUpdate {
                    title: Some("Premium polo".to_string()),
                    price: Some(Money::from_cents(500)),
                    ..ProductUpdate::default()
                },
                ExpansionDefaults::default(),
                Utc::now(),
            )
            .unwrap();

        assert!(!report.variants_regenerated);
        assert_eq!(product.title, "Premium polo");
        assert_eq!(product.variants[0].stock, 5);
    }

    #[test]
    fn clearing_options_drops_all_variants() {
        let mut product = shirt();
        product
            .apply_update(
                ProductUpdate {
                    options: Some(vec![]),
                    ..ProductUpdate::default()
                },
                ExpansionDefaults::default(),
                Utc::now(),
            )
            .unwrap();
        assert!(product.variants.is_empty());
    }

    #[test]
    fn check_order_quantity_enforces_moq_and_stock() {
        let mut product = shirt();
        product.available = 20;
        assert_eq!(
            product.check_order_quantity(5),
            Err(DomainError::BelowMinimumOrder {
                quantity: 5,
                minimum: 10
            })
        );
        assert_eq!(product.check_order_quantity(15), Ok(true));
        assert_eq!(product.check_order_quantity(25), Ok(false));
        assert!(product.check_order_quantity(0).is_err());
    }

    #[test]
    fn create_rejects_price_above_ceiling() {
        let mut input = shirt_input();
        input.price = Money::from_cents(5_000_000_000);
        assert_eq!(
            Product::create(
                ProductId::new(),
                UserId::new(),
                input,
                ExpansionDefaults::default(),
                Utc::now()
            ),
            Err(DomainError::PriceTooLarge {
                field: "price",
                cents: 5_000_000_000,
                max: MAX_UNIT_PRICE.cents()
            })
        );
    }

    #[test]
    fn quote_for_huge_quantity_reports_overflow_instead_of_panicking() {
        let mut product = shirt();
        product.price_tiers.clear();
        product.price = Money::from_cents(5_000_000_000);
        assert_eq!(
            product.quote(u32::MAX, &VariantSelection::default()),
            Err(DomainError::AmountOverflow)
        );

        product.price = MAX_UNIT_PRICE;
        let quote = product.quote(u32::MAX, &VariantSelection::default()).unwrap();
        assert_eq!(
            quote.total_price.cents(),
            MAX_UNIT_PRICE.cents() * i64::from(u32::MAX)
        );
    }

    #[test]
    fn derived_available_saturates() {
        let mut input = shirt_input();
        input.variant_stock = Some(u32::MAX);
        let product = Product::create(
            ProductId::new(),
            UserId::new(),
            input,
            ExpansionDefaults::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(product.variants.len(), 4);
        assert_eq!(product.available, u32::MAX);
    }
}
