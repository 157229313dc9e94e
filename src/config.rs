//! Runtime configuration read from the environment (`.env` is loaded first by `main`).

use std::time::Duration;
use thiserror::Error;

use crate::services::payment::GatewayConfig;

/// Environment variable for the HTTP port.
pub const PORT_ENV_VAR: &str = "PORT";
/// Environment variable for the Postgres URL. Unset means the in-memory store.
pub const DATABASE_URL_ENV_VAR: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS_ENV_VAR: &str = "DATABASE_MAX_CONNECTIONS";
/// Environment variable for the NATS server. Unset disables event publishing.
pub const NATS_URL_ENV_VAR: &str = "NATS_URL";
pub const PAYMENT_MERCHANT_ID_ENV_VAR: &str = "PAYMENT_MERCHANT_ID";
pub const PAYMENT_REQUEST_URL_ENV_VAR: &str = "PAYMENT_REQUEST_URL";
pub const PAYMENT_VERIFY_URL_ENV_VAR: &str = "PAYMENT_VERIFY_URL";
pub const PAYMENT_GATEWAY_URL_ENV_VAR: &str = "PAYMENT_GATEWAY_URL";
pub const PAYMENT_CALLBACK_URL_ENV_VAR: &str = "PAYMENT_CALLBACK_URL";
pub const PAYMENT_TIMEOUT_ENV_VAR: &str = "PAYMENT_TIMEOUT_SECS";

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 15;

const DEFAULT_MERCHANT_ID: &str = "XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX";
const DEFAULT_REQUEST_URL: &str = "https://sandbox.zarinpal.com/pg/rest/WebGate/PaymentRequest.json";
const DEFAULT_VERIFY_URL: &str = "https://sandbox.zarinpal.com/pg/rest/WebGate/PaymentVerification.json";
const DEFAULT_GATEWAY_URL: &str = "https://sandbox.zarinpal.com/pg/StartPay/";
const DEFAULT_CALLBACK_URL: &str = "http://localhost:8083/api/v1/payments/callback";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub nats_url: Option<String>,
    pub payment: GatewayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let text = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let timeout_secs: u64 = number(PAYMENT_TIMEOUT_ENV_VAR, get(PAYMENT_TIMEOUT_ENV_VAR), DEFAULT_PAYMENT_TIMEOUT_SECS)?;
        if timeout_secs == 0 { return Err(ConfigError::Zero(PAYMENT_TIMEOUT_ENV_VAR)); }
        let max_connections: u32 = number(DATABASE_MAX_CONNECTIONS_ENV_VAR, get(DATABASE_MAX_CONNECTIONS_ENV_VAR), DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 { return Err(ConfigError::Zero(DATABASE_MAX_CONNECTIONS_ENV_VAR)); }

        Ok(Self {
            port: number(PORT_ENV_VAR, get(PORT_ENV_VAR), DEFAULT_PORT)?,
            database_url: get(DATABASE_URL_ENV_VAR),
            max_connections,
            nats_url: get(NATS_URL_ENV_VAR),
            payment: GatewayConfig {
                merchant_id: text(PAYMENT_MERCHANT_ID_ENV_VAR, DEFAULT_MERCHANT_ID),
                request_url: text(PAYMENT_REQUEST_URL_ENV_VAR, DEFAULT_REQUEST_URL),
                verify_url: text(PAYMENT_VERIFY_URL_ENV_VAR, DEFAULT_VERIFY_URL),
                gateway_url: text(PAYMENT_GATEWAY_URL_ENV_VAR, DEFAULT_GATEWAY_URL),
                callback_url: text(PAYMENT_CALLBACK_URL_ENV_VAR, DEFAULT_CALLBACK_URL),
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn number<T: std::str::FromStr>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidNumber { var, value: v }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 8083);
        assert_eq!(c.max_connections, 10);
        assert!(c.database_url.is_none());
        assert!(c.nats_url.is_none());
        assert_eq!(c.payment.timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let c = config(&[("PORT", "9000"), ("DATABASE_URL", "  "), ("PAYMENT_GATEWAY_URL", "https://gw/StartPay/")]).unwrap();
        assert_eq!(c.port, 9000);
        assert!(c.database_url.is_none());
        assert_eq!(c.payment.gateway_url, "https://gw/StartPay/");
    }

    #[test]
    fn test_invalid_numbers() {
        assert_eq!(config(&[("PORT", "http")]).unwrap_err(), ConfigError::InvalidNumber { var: "PORT", value: "http".into() });
        assert_eq!(config(&[("PAYMENT_TIMEOUT_SECS", "0")]).unwrap_err(), ConfigError::Zero("PAYMENT_TIMEOUT_SECS"));
    }
}
