use crate::application::CheckoutSettings;
use crate::domain::errors::{DomainError, DomainResult};
use crate::ports::{CallbackUrls, CurrencyContext};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Checkout service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Base URL of the cart and order services
    pub backend_base_url: Url,

    /// Bearer token forwarded to the backend
    pub backend_api_token: Option<String>,

    /// Base of the gateway callback routes
    pub app_base_url: Url,

    /// Where the pending-order marker lives
    pub pending_order_path: PathBuf,

    /// Seconds after which a pending-order marker is abandoned
    pub pending_order_ttl_secs: i64,

    pub currency_id: u64,
    pub currency_rate: Decimal,

    /// HTTP client timeout in seconds
    pub request_timeout_secs: u64,

    pub server_host: String,
    pub server_port: u16,
}

impl CheckoutConfig {
    /// Read from the process environment, after loading `.env` if present
    pub fn from_env() -> DomainResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let backend_base_url = get("BACKEND_BASE_URL")
            .ok_or_else(|| {
                DomainError::ConfigurationError("BACKEND_BASE_URL must be set".to_string())
            })
            .and_then(|raw| parse_url("BACKEND_BASE_URL", &raw))?;

        let app_base_url = parse_url(
            "APP_BASE_URL",
            &get("APP_BASE_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
        )?;

        Ok(Self {
            backend_base_url,
            backend_api_token: get("BACKEND_API_TOKEN"),
            app_base_url,
            pending_order_path: get("PENDING_ORDER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./pending_order.json")),
            pending_order_ttl_secs: parse_or("PENDING_ORDER_TTL_SECS", &get, 1800)?,
            currency_id: parse_or("CURRENCY_ID", &get, 1)?,
            currency_rate: parse_or("CURRENCY_RATE", &get, Decimal::ONE)?,
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", &get, 30)?,
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_or("SERVER_PORT", &get, 3000)?,
        })
    }

    pub fn callback_urls(&self) -> DomainResult<CallbackUrls> {
        let route = |name: &str| {
            self.app_base_url
                .join(&format!("/payment/{}", name))
                .map_err(|e| DomainError::ConfigurationError(format!("APP_BASE_URL: {}", e)))
        };
        Ok(CallbackUrls {
            success: route("success")?,
            failure: route("failure")?,
            callback: route("callback")?,
        })
    }

    pub fn checkout_settings(&self) -> DomainResult<CheckoutSettings> {
        Ok(CheckoutSettings {
            currency: CurrencyContext {
                currency_id: self.currency_id,
                rate: self.currency_rate,
            },
            callbacks: self.callback_urls()?,
            pending_order_ttl: chrono::Duration::seconds(self.pending_order_ttl_secs),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_url(key: &str, raw: &str) -> DomainResult<Url> {
    Url::parse(raw).map_err(|e| DomainError::ConfigurationError(format!("{}: {}", key, e)))
}

fn parse_or<T, G>(key: &str, get: &G, default: T) -> DomainResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| DomainError::ConfigurationError(format!("{}: {}", key, e))),
        None => Ok(default),
    }
}
