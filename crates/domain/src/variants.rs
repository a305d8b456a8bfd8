//! Variant combination generation.
//!
//! Options are expanded into the full cartesian product of their values.
//! Iteration is outer-to-inner in declared option order with values in
//! declared order, so `SKU_<index>` stays stable across regenerations as long
//! as options and values are not reordered.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::{MAX_UNIT_PRICE, Money};

/// Stock assigned to a freshly generated combination.
pub const DEFAULT_VARIANT_STOCK: u32 = 1000;

/// MOQ assigned to a freshly generated combination.
pub const DEFAULT_VARIANT_MOQ: u32 = 1;

/// Most combinations a single product may expand into.
pub const MAX_VARIANTS: usize = 5_000;

/// Kind of option, used by clients to pick an input widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    #[default]
    Select,
    Color,
    Size,
    Material,
    Style,
}

/// One selectable value of an option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionValue {
    /// Display name, e.g. "Red".
    pub name: String,

    /// Stored value; falls back to `name` when empty.
    #[serde(default)]
    pub value: String,

    /// Added to the base price when this value is chosen.
    #[serde(default)]
    pub price_modifier: Money,

    /// Swatch colour for colour options.
    #[serde(default)]
    pub color: Option<String>,
}

impl OptionValue {
    /// Creates a value whose stored value equals its name.
    pub fn new(name: impl Into<String>, price_modifier: Money) -> Self {
        let name = name.into();
        Self {
            value: name.clone(),
            name,
            price_modifier,
            color: None,
        }
    }

    /// Returns the value recorded on generated variants.
    pub fn attribute_value(&self) -> &str {
        if self.value.is_empty() {
            &self.name
        } else {
            &self.value
        }
    }
}

/// A named option such as "Color" or "Size".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantOption {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: OptionKind,

    #[serde(default)]
    pub values: Vec<OptionValue>,
}

impl VariantOption {
    /// Creates an option of the default kind.
    pub fn new(name: impl Into<String>, values: Vec<OptionValue>) -> Self {
        Self {
            name: name.into(),
            kind: OptionKind::default(),
            values,
        }
    }

    /// Sets the option kind.
    pub fn with_kind(mut self, kind: OptionKind) -> Self {
        self.kind = kind;
        self
    }
}

/// One `(option name, chosen value)` pair of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantAttribute {
    pub name: String,
    pub value: String,
}

/// A concrete, purchasable combination of option values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub attributes: Vec<VariantAttribute>,
    pub price: Money,
    pub stock: u32,
    pub sku: String,
    pub moq: u32,
}

impl Variant {
    /// Returns the value chosen for the named option (case-insensitive).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.value.as_str())
    }
}

/// Defaults applied to each generated combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionDefaults {
    pub stock: u32,
    pub moq: u32,
}

impl ExpansionDefaults {
    /// Overrides the default stock.
    pub fn with_stock(stock: u32) -> Self {
        Self {
            stock,
            ..Self::default()
        }
    }
}

impl Default for ExpansionDefaults {
    fn default() -> Self {
        Self {
            stock: DEFAULT_VARIANT_STOCK,
            moq: DEFAULT_VARIANT_MOQ,
        }
    }
}

/// Result of regenerating a product's variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regeneration {
    pub variants: Vec<Variant>,

    /// True when at least one previous variant carried stock that differed
    /// from the default and has now been replaced.
    pub discarded_manual_stock: bool,
}

/// Rejects option lists with duplicate names (case-insensitive), price
/// modifiers beyond [`MAX_UNIT_PRICE`] and lists that would expand past
/// [`MAX_VARIANTS`].
pub fn validate_options(options: &[VariantOption]) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for option in options {
        if option.name.trim().is_empty() {
            return Err(DomainError::MissingField {
                field: "option name",
            });
        }
        if !seen.insert(option.name.to_ascii_lowercase()) {
            return Err(DomainError::DuplicateOption {
                name: option.name.clone(),
            });
        }
        if let Some(value) = option
            .values
            .iter()
            .find(|value| !value.price_modifier.within_unit_bound())
        {
            return Err(DomainError::PriceTooLarge {
                field: "priceModifier",
                cents: value.price_modifier.cents(),
                max: MAX_UNIT_PRICE.cents(),
            });
        }
    }
    combination_count(options)?;
    Ok(())
}

/// Number of combinations `options` expand into, capped at [`MAX_VARIANTS`].
///
/// Empty options do not contribute. Computed before anything is allocated.
pub fn combination_count(options: &[VariantOption]) -> Result<usize, DomainError> {
    let mut populated = options.iter().filter(|o| !o.values.is_empty()).peekable();
    if populated.peek().is_none() {
        return Ok(0);
    }
    let count = populated
        .try_fold(1usize, |acc, option| acc.checked_mul(option.values.len()))
        .unwrap_or(usize::MAX);
    if count > MAX_VARIANTS {
        return Err(DomainError::TooManyVariants {
            count,
            max: MAX_VARIANTS,
        });
    }
    Ok(count)
}

/// Expands options into every combination of their values.
///
/// Options without values are skipped. When every option is empty the
/// result is empty and the product sells as a single unvaried SKU. Fails
/// with [`DomainError::TooManyVariants`] before expanding when the product
/// of value counts exceeds [`MAX_VARIANTS`].
pub fn expand_variants(
    options: &[VariantOption],
    base_price: Money,
    defaults: ExpansionDefaults,
) -> Result<Vec<Variant>, DomainError> {
    combination_count(options)?;
    let populated: Vec<&VariantOption> = options.iter().filter(|o| !o.values.is_empty()).collect();
    if populated.is_empty() {
        return Ok(Vec::new());
    }

    let mut combinations: Vec<Vec<(&VariantOption, &OptionValue)>> = vec![Vec::new()];
    for option in &populated {
        let mut next = Vec::with_capacity(combinations.len() * option.values.len());
        for prefix in &combinations {
            for value in &option.values {
                let mut combination = prefix.clone();
                combination.push((*option, value));
                next.push(combination);
            }
        }
        combinations = next;
    }

    combinations
        .into_iter()
        .enumerate()
        .map(|(index, combination)| {
            let price = combination
                .iter()
                .try_fold(base_price, |acc, (_, value)| {
                    acc.checked_add(value.price_modifier)
                })?;
            let attributes = combination
                .iter()
                .map(|(option, value)| VariantAttribute {
                    name: option.name.clone(),
                    value: value.attribute_value().to_string(),
                })
                .collect();
            Ok(Variant {
                attributes,
                price,
                stock: defaults.stock,
                sku: format!("SKU_{index}"),
                moq: defaults.moq,
            })
        })
        .collect()
}

/// Replaces `existing` with a fresh expansion, reporting lost stock edits.
pub fn regenerate(
    existing: &[Variant],
    options: &[VariantOption],
    base_price: Money,
    defaults: ExpansionDefaults,
) -> Result<Regeneration, DomainError> {
    let discarded_manual_stock = existing.iter().any(|v| v.stock != defaults.stock);
    Ok(Regeneration {
        variants: expand_variants(options, base_price, defaults)?,
        discarded_manual_stock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_size() -> Vec<VariantOption> {
        vec![
            VariantOption::new(
                "Color",
                vec![
                    OptionValue::new("Red", Money::zero()),
                    OptionValue::new("Blue", Money::from_cents(20)),
                ],
            )
            .with_kind(OptionKind::Color),
            VariantOption::new(
                "Size",
                vec![
                    OptionValue::new("S", Money::zero()),
                    OptionValue::new("M", Money::from_cents(10)),
                ],
            )
            .with_kind(OptionKind::Size),
        ]
    }

    #[test]
    fn expands_color_by_size_in_declared_order() {
        let variants = expand_variants(
            &color_size(),
            Money::from_cents(500),
            ExpansionDefaults::default(),
        )
        .unwrap();

        let summary: Vec<(&str, &str, i64, &str)> = variants
            .iter()
            .map(|v| {
                (
                    v.attribute("Color").unwrap(),
                    v.attribute("Size").unwrap(),
                    v.price.cents(),
                    v.sku.as_str(),
                )
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                ("Red", "S", 500, "SKU_0"),
                ("Red", "M", 510, "SKU_1"),
                ("Blue", "S", 520, "SKU_2"),
                ("Blue", "M", 530, "SKU_3"),
            ]
        );
    }

    #[test]
    fn generated_variants_carry_defaults() {
        let variants =
            expand_variants(&color_size(), Money::zero(), ExpansionDefaults::default()).unwrap();
        assert!(variants.iter().all(|v| v.stock == DEFAULT_VARIANT_STOCK));
        assert!(variants.iter().all(|v| v.moq == DEFAULT_VARIANT_MOQ));

        let custom =
            expand_variants(&color_size(), Money::zero(), ExpansionDefaults::with_stock(7))
                .unwrap();
        assert!(custom.iter().all(|v| v.stock == 7));
    }

    #[test]
    fn combination_count_is_product_of_value_counts() {
        let mut options = color_size();
        options.push(VariantOption::new(
            "Material",
            vec![
                OptionValue::new("Cotton", Money::zero()),
                OptionValue::new("Linen", Money::zero()),
                OptionValue::new("Silk", Money::from_cents(100)),
            ],
        ));

        let variants = expand_variants(&options, Money::zero(), ExpansionDefaults::default()).unwrap();
        assert_eq!(variants.len(), 2 * 2 * 3);

        let skus: HashSet<&str> = variants.iter().map(|v| v.sku.as_str()).collect();
        assert_eq!(skus.len(), variants.len());
    }

    #[test]
    fn empty_options_are_skipped_not_nulling() {
        let mut options = color_size();
        options.insert(1, VariantOption::new("Finish", vec![]));

        let variants = expand_variants(&options, Money::zero(), ExpansionDefaults::default()).unwrap();
        assert_eq!(variants.len(), 4);
        assert!(variants.iter().all(|v| v.attribute("Finish").is_none()));
    }

    #[test]
    fn all_empty_options_produce_no_variants() {
        let options = vec![
            VariantOption::new("Color", vec![]),
            VariantOption::new("Size", vec![]),
        ];
        let defaults = ExpansionDefaults::default();
        assert!(expand_variants(&options, Money::zero(), defaults).unwrap().is_empty());
        assert!(expand_variants(&[], Money::zero(), defaults).unwrap().is_empty());
    }

    #[test]
    fn expansion_is_reproducible() {
        let defaults = ExpansionDefaults::default();
        let first = expand_variants(&color_size(), Money::from_cents(500), defaults).unwrap();
        let second = expand_variants(&color_size(), Money::from_cents(500), defaults).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn attribute_value_prefers_stored_value() {
        let mut value = OptionValue::new("Navy Blue", Money::zero());
        value.value = "navy".to_string();
        assert_eq!(value.attribute_value(), "navy");

        value.value.clear();
        assert_eq!(value.attribute_value(), "Navy Blue");
    }

    #[test]
    fn regenerate_reports_discarded_stock() {
        let defaults = ExpansionDefaults::default();
        let mut existing = expand_variants(&color_size(), Money::from_cents(500), defaults).unwrap();

        let clean = regenerate(&existing, &color_size(), Money::from_cents(600), defaults).unwrap();
        assert!(!clean.discarded_manual_stock);
        assert_eq!(clean.variants[0].price.cents(), 600);

        existing[2].stock = 3;
        let lossy = regenerate(&existing, &color_size(), Money::from_cents(600), defaults).unwrap();
        assert!(lossy.discarded_manual_stock);
        assert!(lossy.variants.iter().all(|v| v.stock == DEFAULT_VARIANT_STOCK));
    }

    #[test]
    fn validate_options_rejects_duplicates() {
        let mut options = color_size();
        options.push(VariantOption::new("color", vec![]));
        assert_eq!(
            validate_options(&options),
            Err(DomainError::DuplicateOption {
                name: "color".to_string()
            })
        );
        assert!(validate_options(&color_size()).is_ok());
    }

    #[test]
    fn expansion_past_the_cap_is_rejected_before_allocating() {
        let values: Vec<OptionValue> = (0..10)
            .map(|i| OptionValue::new(format!("v{i}"), Money::zero()))
            .collect();
        let options: Vec<VariantOption> = (0..8)
            .map(|i| VariantOption::new(format!("opt{i}"), values.clone()))
            .collect();

        let err = expand_variants(&options, Money::from_cents(100), ExpansionDefaults::default())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::TooManyVariants {
                count: 100_000_000,
                max: MAX_VARIANTS
            }
        );
        assert!(matches!(
            validate_options(&options),
            Err(DomainError::TooManyVariants { .. })
        ));
    }

    #[test]
    fn combination_count_saturates_instead_of_wrapping() {
        let values: Vec<OptionValue> = (0..1000)
            .map(|i| OptionValue::new(format!("v{i}"), Money::zero()))
            .collect();
        let options: Vec<VariantOption> = (0..8)
            .map(|i| VariantOption::new(format!("opt{i}"), values.clone()))
            .collect();

        assert_eq!(
            combination_count(&options),
            Err(DomainError::TooManyVariants {
                count: usize::MAX,
                max: MAX_VARIANTS
            })
        );
        assert_eq!(combination_count(&color_size()), Ok(4));
        assert_eq!(combination_count(&[]), Ok(0));
    }

    #[test]
    fn oversized_price_modifier_is_rejected() {
        let options = vec![VariantOption::new(
            "Finish",
            vec![OptionValue::new(
                "Gold",
                Money::from_cents(MAX_UNIT_PRICE.cents() + 1),
            )],
        )];
        assert!(matches!(
            validate_options(&options),
            Err(DomainError::PriceTooLarge {
                field: "priceModifier",
                ..
            })
        ));
    }
}
