use chrono::Duration;
use domain::{DEFAULT_VARIANT_MOQ, DEFAULT_VARIANT_STOCK, ExpansionDefaults};

/// Tunables shared by the services.
#[derive(Debug, Clone, Copy)]
pub struct MarketSettings {
    /// Lifetime of a request that does not name its own `expiresAt`.
    pub request_ttl: Duration,
    /// Stock and MOQ given to freshly generated variants.
    pub expansion: ExpansionDefaults,
}

impl MarketSettings {
    pub fn new(request_ttl_days: i64, default_variant_stock: u32) -> Self {
        Self {
            request_ttl: Duration::days(request_ttl_days),
            expansion: ExpansionDefaults {
                stock: default_variant_stock,
                moq: DEFAULT_VARIANT_MOQ,
            },
        }
    }
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self::new(30, DEFAULT_VARIANT_STOCK)
    }
}
