use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::domain::funnel::FunnelServices;
use crate::services::booking_record::HttpBookingRecordService;
use crate::services::fare_quote::HttpFareQuoteGateway;
use crate::services::payment_confirmation::HttpPaymentConfirmer;
use crate::services::payment_intent::HttpPaymentIntentService;

/// Origins that run against the payment provider's test environment.
const TEST_ORIGIN_PREFIXES: [&str; 5] = [
    "http://localhost",
    "https://localhost",
    "http://127.0.0.1",
    "https://127.0.0.1",
    "http://[::1]",
];

const DEFAULT_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_CURRENCY: &str = "gbp";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3030";
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_RECONCILE_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Test,
    Live,
}

impl PaymentMode {
    /// Loopback origins are test; everything else is live.
    #[must_use]
    pub fn for_origin(origin: &str) -> Self {
        let origin = origin.trim().to_ascii_lowercase();
        let is_local = TEST_ORIGIN_PREFIXES.iter().any(|prefix| {
            origin
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(':') || rest.starts_with('/'))
        });
        if is_local {
            PaymentMode::Test
        } else {
            PaymentMode::Live
        }
    }

    #[must_use]
    pub fn is_test(self) -> bool {
        self == PaymentMode::Test
    }
}

#[derive(Debug, Clone)]
pub struct PublishableKeys {
    pub test: String,
    pub live: String,
}

impl PublishableKeys {
    #[must_use]
    pub fn for_mode(&self, mode: PaymentMode) -> &str {
        match mode {
            PaymentMode::Test => &self.test,
            PaymentMode::Live => &self.live,
        }
    }
}

/// Payment settings resolved once at startup and shared by every funnel run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSettings {
    pub mode: PaymentMode,
    pub currency: String,
    pub publishable_key: String,
    pub show_test_banner: bool,
}

impl PaymentSettings {
    #[must_use]
    pub fn resolve(origin: &str, keys: &PublishableKeys, currency: impl Into<String>) -> Self {
        let mode = PaymentMode::for_origin(origin);
        Self {
            mode,
            currency: currency.into(),
            publishable_key: keys.for_mode(mode).to_string(),
            show_test_banner: mode.is_test(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct FunnelConfig {
    pub fare_api_url: String,
    pub booking_api_url: String,
    pub payment_api_url: String,
    pub payment_confirm_url: String,
    pub publishable_keys: PublishableKeys,
    pub app_origin: String,
    pub currency: String,
    pub bind_addr: SocketAddr,
    pub reconcile_interval: Duration,
    pub reconcile_max_attempts: u32,
    pub idle_timeout: Duration,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &'static str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional_number<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    optional(name, &default.to_string())
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

impl FunnelConfig {
    /// Reads configuration from the environment. Call `dotenv` first to pick
    /// up a local `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = optional("BIND_ADDR", DEFAULT_BIND_ADDR)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;
        let reconcile_secs = optional_number("RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS)?;
        let reconcile_max_attempts =
            optional_number("RECONCILE_MAX_ATTEMPTS", DEFAULT_RECONCILE_MAX_ATTEMPTS)?;
        let idle_secs = optional_number("FUNNEL_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT_SECS)?;

        Ok(Self {
            fare_api_url: required("FARE_API_URL")?,
            booking_api_url: required("BOOKING_API_URL")?,
            payment_api_url: required("PAYMENT_API_URL")?,
            payment_confirm_url: required("PAYMENT_CONFIRM_URL")?,
            publishable_keys: PublishableKeys {
                test: required("PAYMENT_TEST_PUBLIC_KEY")?,
                live: required("PAYMENT_LIVE_PUBLIC_KEY")?,
            },
            app_origin: optional("APP_ORIGIN", DEFAULT_ORIGIN),
            currency: optional("PAYMENT_CURRENCY", DEFAULT_CURRENCY),
            bind_addr,
            reconcile_interval: Duration::from_secs(reconcile_secs.max(1)),
            reconcile_max_attempts,
            idle_timeout: Duration::from_secs(idle_secs),
        })
    }

    #[must_use]
    pub fn payment_settings(&self) -> PaymentSettings {
        PaymentSettings::resolve(&self.app_origin, &self.publishable_keys, self.currency.clone())
    }
}

/// Wires the HTTP collaborators for every funnel run.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn funnel_services(config: &FunnelConfig) -> Result<Arc<FunnelServices>, ConfigError> {
    let client = Client::builder().build()?;
    let payment = config.payment_settings();

    let fare_quotes = Arc::new(HttpFareQuoteGateway::new(
        client.clone(),
        config.fare_api_url.clone(),
    ));
    let booking_records = Arc::new(HttpBookingRecordService::new(
        client.clone(),
        config.booking_api_url.clone(),
    ));
    let payment_intents = Arc::new(HttpPaymentIntentService::new(
        client.clone(),
        config.payment_api_url.clone(),
    ));
    let payment_confirmer = Arc::new(HttpPaymentConfirmer::new(
        client,
        config.payment_confirm_url.clone(),
        payment.publishable_key.clone(),
    ));

    Ok(Arc::new(
        FunnelServices::new(
            fare_quotes,
            booking_records,
            payment_intents,
            payment_confirmer,
            payment,
        )
        .with_reconcile_attempts(config.reconcile_max_attempts),
    ))
}
