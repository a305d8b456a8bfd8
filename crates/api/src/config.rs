//! Application configuration loaded from environment variables.

use saga::MarketSettings;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `DEFAULT_VARIANT_STOCK`: stock of freshly generated variants (default: `1000`)
/// - `REQUEST_TTL_DAYS`: request lifetime when `expiresAt` is omitted (default: `30`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub default_variant_stock: u32,
    pub request_ttl_days: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            default_variant_stock: lookup("DEFAULT_VARIANT_STOCK")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_variant_stock),
            request_ttl_days: lookup("REQUEST_TTL_DAYS")
                .and_then(|d| d.parse().ok())
                .filter(|days| *days > 0)
                .unwrap_or(defaults.request_ttl_days),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Service tunables derived from this configuration.
    pub fn settings(&self) -> MarketSettings {
        MarketSettings::new(self.request_ttl_days, self.default_variant_stock)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            default_variant_stock: 1000,
            request_ttl_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.default_variant_stock, 1000);
        assert_eq!(config.request_ttl_days, 30);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_marketplace_settings() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/market"),
            ("DEFAULT_VARIANT_STOCK", "250"),
            ("REQUEST_TTL_DAYS", "14"),
        ]);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/market")
        );
        let settings = config.settings();
        assert_eq!(settings.expansion.stock, 250);
        assert_eq!(settings.request_ttl, chrono::Duration::days(14));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("REQUEST_TTL_DAYS", "-3"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.request_ttl_days, 30);
        assert!(config.database_url.is_none());
    }
}
