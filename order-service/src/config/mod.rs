use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, get_env, is_production};
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderServiceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub mongodb: MongoConfig,
    pub gateway: GatewayConfig,
    pub room_cache: RoomCacheConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

/// Payment provider credentials and endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub client_id: String,
    pub secret_key: Secret<String>,
    /// Secret for verifying webhook signatures; unset disables the check.
    pub webhook_key: Option<Secret<String>>,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomCacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl OrderServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = is_production();

        Ok(Self {
            common,
            service_name: get_env("SERVICE_NAME", Some("order-service"), is_prod)?,
            mongodb: MongoConfig {
                uri: Secret::new(get_env(
                    "MONGODB_URI",
                    Some("mongodb://localhost:27017"),
                    is_prod,
                )?),
                database: get_env("MONGODB_DATABASE", Some("order_db"), is_prod)?,
            },
            gateway: GatewayConfig {
                base_url: get_env("PAYMENT_GATEWAY_BASE_URL", None, is_prod)?,
                key_id: get_env("PAYMENT_GATEWAY_KEY_ID", None, is_prod)?,
                client_id: get_env("PAYMENT_GATEWAY_CLIENT_ID", None, is_prod)?,
                secret_key: Secret::new(get_env("PAYMENT_GATEWAY_SECRET_KEY", None, is_prod)?),
                webhook_key: optional_env("PAYMENT_GATEWAY_WEBHOOK_KEY").map(Secret::new),
                timeout_secs: parse_env("PAYMENT_GATEWAY_TIMEOUT_SECS", "20", is_prod)?,
            },
            room_cache: RoomCacheConfig {
                ttl_secs: parse_env("ROOM_CACHE_TTL_SECS", "300", is_prod)?,
                capacity: parse_env("ROOM_CACHE_CAPACITY", "1000", is_prod)?,
            },
            otlp_endpoint: optional_env("OTLP_ENDPOINT"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_reports_key_on_bad_value() {
        // Unset variable falls back to the default outside production.
        let parsed: u64 = parse_env("ORDER_SERVICE_TEST_UNSET_NUMBER", "42", false).unwrap();
        assert_eq!(parsed, 42);

        let err = parse_env::<u64>("ORDER_SERVICE_TEST_UNSET_NUMBER", "forty", false).unwrap_err();
        assert!(err.to_string().contains("ORDER_SERVICE_TEST_UNSET_NUMBER"));
    }

    #[test]
    fn gateway_timeout_is_in_seconds() {
        let gateway = GatewayConfig {
            base_url: "http://localhost".to_string(),
            key_id: "key".to_string(),
            client_id: "client".to_string(),
            secret_key: Secret::new("secret".to_string()),
            webhook_key: None,
            timeout_secs: 20,
        };
        assert_eq!(gateway.timeout(), Duration::from_secs(20));
    }
}
