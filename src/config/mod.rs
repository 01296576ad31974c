use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::analytics::live::DEFAULT_FALLBACK_LIMIT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub identity: IdentityConfig,
    pub analytics: AnalyticsConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    /// Process-local store, lost on restart. Composite indexes are declared
    /// so it behaves like a fully provisioned database.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// HMAC key for visitor pseudonyms; a random key is used when unset
    #[serde(skip_serializing)]
    pub visitor_id_secret: Option<String>,
    /// Host the product itself is served from, for `internal` referers
    pub app_host: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Only trust the socket address
    #[default]
    None,
    /// Trust Forwarded / X-Forwarded-For
    Standard,
    /// Trust CF-Connecting-IP
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    /// Proxy networks skipped when walking X-Forwarded-For right to left
    pub trusted_proxies: Vec<IpNet>,
    /// Alternative to `trusted_proxies`: number of proxy hops to skip
    pub num_trusted_proxies: Option<usize>,
    /// Rows scanned by the live-visitor query when its index is missing
    pub live_fallback_limit: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
            live_fallback_limit: DEFAULT_FALLBACK_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub owner_cache_max_entries: u64,
    pub owner_cache_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            owner_cache_max_entries: 10_000,
            owner_cache_ttl_secs: 300,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {value}")),
        Err(_) => Ok(default),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend = match env_or("DATABASE_BACKEND", "sqlite").to_lowercase().as_str() {
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let trusted_proxy_mode = match env_or("TRUSTED_PROXY_MODE", "none").to_lowercase().as_str() {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = non_empty_env("TRUSTED_PROXIES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|cidr| {
                        cidr.parse::<IpNet>()
                            .with_context(|| format!("TRUSTED_PROXIES contains an invalid CIDR: {cidr}"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let num_trusted_proxies = non_empty_env("NUM_TRUSTED_PROXIES")
            .map(|v| {
                v.parse::<usize>()
                    .with_context(|| format!("NUM_TRUSTED_PROXIES has an invalid value: {v}"))
            })
            .transpose()?;

        let cache_defaults = CacheConfig::default();

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: env_or("DATABASE_URL", "sqlite://./sharetrail.db"),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            api_server: ServerConfig {
                host: env_or("API_HOST", "127.0.0.1"),
                port: parse_env("API_PORT", 8080)?,
            },
            identity: IdentityConfig {
                visitor_id_secret: non_empty_env("VISITOR_ID_SECRET"),
                app_host: non_empty_env("APP_HOST"),
            },
            analytics: AnalyticsConfig {
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
                live_fallback_limit: parse_env("LIVE_FALLBACK_LIMIT", DEFAULT_FALLBACK_LIMIT)?,
            },
            cache: CacheConfig {
                owner_cache_max_entries: parse_env(
                    "OWNER_CACHE_MAX_ENTRIES",
                    cache_defaults.owner_cache_max_entries,
                )?,
                owner_cache_ttl_secs: parse_env(
                    "OWNER_CACHE_TTL_SECS",
                    cache_defaults.owner_cache_ttl_secs,
                )?,
            },
        })
    }
}
