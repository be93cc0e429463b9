//! Server configuration read from the environment.
//!
//! | Variable | Default | Purpose |
//! |----------|---------|---------|
//! | `DATABASE_URL` | `postgres://localhost/datalayer` | PostgreSQL connection |
//! | `HOST` / `PORT` | `0.0.0.0` / `3000` | Listen address |
//! | `SITE_URL` | `http://localhost` | `affiliation` of every envelope |
//! | `SITE_NAME` | `Storefront` | Site name |
//! | `SHOP_CURRENCY` | `USD` | Currency for cart and product events |
//! | `PRICE_DECIMALS` | `2` | Rounding of monetary fields |
//! | `REDIS_ENABLED` / `REDIS_URL` | `true` / `redis://localhost:6379` | Shared list cache |
//! | `LIST_CACHE_TTL` | `600` | Listing cache lifetime in seconds |
//! | `BRIDGE_TOKEN_SECRET` | unset | HMAC key for bridge tokens; unset disables the bridge |
//! | `STOREFRONT_API_KEY` | unset | Key the storefront backend authenticates with |
//! | `ADMIN_API_KEYS` | unset | `admin_id=key,...` operator credentials |
//! | `MAINTENANCE_SECRET` | unset | Shared secret for clearing logs; unset disables clearing |
//! | `LOG_PAGE_SIZE` | `10` | Rows per log viewer page |
//! | `RATE_LIMIT_ENABLED` / `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_PERIOD_SECS` | `true` / `100` / `60` | Global limiter |

use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;

use datalayer_core::money::DEFAULT_PRICE_DECIMALS;
use datalayer_core::{Error, Result, SiteIdentity};

/// Default listing cache lifetime (10 minutes).
pub const DEFAULT_LIST_CACHE_TTL_SECS: u64 = 600;

/// Default number of rows per log viewer page.
pub const DEFAULT_LOG_PAGE_SIZE: i64 = 10;

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub site: SiteIdentity,
    pub currency: String,
    pub price_decimals: u32,
    pub redis_enabled: bool,
    pub redis_url: String,
    pub list_cache_ttl: Duration,
    pub bridge_token_secret: Option<String>,
    pub storefront_api_key: Option<String>,
    /// API key -> admin id.
    pub admin_keys: HashMap<String, String>,
    pub maintenance_secret: Option<String>,
    pub log_page_size: i64,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_period_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/datalayer".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            site: SiteIdentity::new("http://localhost", "Storefront"),
            currency: "USD".to_string(),
            price_decimals: DEFAULT_PRICE_DECIMALS,
            redis_enabled: true,
            redis_url: "redis://localhost:6379".to_string(),
            list_cache_ttl: Duration::from_secs(DEFAULT_LIST_CACHE_TTL_SECS),
            bridge_token_secret: None,
            storefront_api_key: None,
            admin_keys: HashMap::new(),
            maintenance_secret: None,
            log_page_size: DEFAULT_LOG_PAGE_SIZE,
            rate_limit_enabled: true,
            rate_limit_requests: 100,
            rate_limit_period_secs: 60,
        }
    }
}

impl ApiConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(&get("PORT"), "PORT", defaults.port)?;
        let price_decimals = parse_or(&get("PRICE_DECIMALS"), "PRICE_DECIMALS", defaults.price_decimals)?;
        if price_decimals > 8 {
            return Err(Error::Config(format!(
                "PRICE_DECIMALS must be at most 8, got {}",
                price_decimals
            )));
        }
        let ttl_secs = parse_or(&get("LIST_CACHE_TTL"), "LIST_CACHE_TTL", DEFAULT_LIST_CACHE_TTL_SECS)?;
        let log_page_size = parse_or(&get("LOG_PAGE_SIZE"), "LOG_PAGE_SIZE", defaults.log_page_size)?;
        if log_page_size < 1 {
            return Err(Error::Config("LOG_PAGE_SIZE must be at least 1".to_string()));
        }

        let admin_keys = match get("ADMIN_API_KEYS") {
            Some(raw) => parse_admin_keys(&raw)?,
            None => HashMap::new(),
        };

        let config = Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            host: get("HOST").unwrap_or(defaults.host),
            port,
            site: SiteIdentity::new(
                get("SITE_URL").unwrap_or(defaults.site.site_url),
                get("SITE_NAME").unwrap_or(defaults.site.site_name),
            ),
            currency: get("SHOP_CURRENCY").unwrap_or(defaults.currency),
            price_decimals,
            redis_enabled: get("REDIS_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.redis_enabled),
            redis_url: get("REDIS_URL").unwrap_or(defaults.redis_url),
            list_cache_ttl: Duration::from_secs(ttl_secs),
            bridge_token_secret: get("BRIDGE_TOKEN_SECRET"),
            storefront_api_key: get("STOREFRONT_API_KEY"),
            admin_keys,
            maintenance_secret: get("MAINTENANCE_SECRET"),
            log_page_size,
            rate_limit_enabled: get("RATE_LIMIT_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.rate_limit_enabled),
            rate_limit_requests: parse_or(
                &get("RATE_LIMIT_REQUESTS"),
                "RATE_LIMIT_REQUESTS",
                defaults.rate_limit_requests,
            )?,
            rate_limit_period_secs: parse_or(
                &get("RATE_LIMIT_PERIOD_SECS"),
                "RATE_LIMIT_PERIOD_SECS",
                defaults.rate_limit_period_secs,
            )?,
        };

        config.warn_disabled_features();
        Ok(config)
    }

    fn warn_disabled_features(&self) {
        if self.bridge_token_secret.is_none() {
            warn!(subsystem = "api", "BRIDGE_TOKEN_SECRET not set, client bridge disabled");
        }
        if self.storefront_api_key.is_none() {
            warn!(subsystem = "api", "STOREFRONT_API_KEY not set, storefront endpoints disabled");
        }
        if self.admin_keys.is_empty() {
            warn!(subsystem = "api", "ADMIN_API_KEYS not set, admin endpoints disabled");
        }
        if self.maintenance_secret.is_none() {
            warn!(subsystem = "api", "MAINTENANCE_SECRET not set, log clearing disabled");
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: &Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

/// Parse `admin_id=key,admin_id=key` into a key -> admin id map.
pub fn parse_admin_keys(raw: &str) -> Result<HashMap<String, String>> {
    let mut keys = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (admin_id, key) = pair
            .split_once('=')
            .map(|(a, k)| (a.trim(), k.trim()))
            .filter(|(a, k)| !a.is_empty() && !k.is_empty())
            .ok_or_else(|| Error::Config(format!("ADMIN_API_KEYS entry is not admin_id=key: {}", pair)))?;
        keys.insert(key.to_string(), admin_id.to_string());
    }
    Ok(keys)
}
