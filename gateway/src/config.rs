//! # Gateway Configuration
//!
//! Per-provider configuration structs, constructed once at startup and
//! passed explicitly into the clients — no hidden singletons. Every
//! secret lives in a [`SecretString`] so it never lands in a debug
//! dump or a log line by accident.
//!
//! `from_env` fails fast: a missing merchant code or hash secret is a
//! [`GatewayError::Configuration`] at boot, not a mystery 500 at the
//! first checkout. The inline sandbox keys you may remember from the
//! original backend are gone; tests construct configs directly with
//! fixture values.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::GatewayError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Timeout for outbound gateway HTTP calls. The sandboxes answer in
/// seconds when they answer at all. The order-level lock is never
/// held while one of these calls is in flight.
pub const GATEWAY_HTTP_TIMEOUT: Duration = Duration::from_secs(12);

/// How long an order may sit in `pending` or `processing` before the
/// sweeper fails it. QR flows settle in minutes or not at all.
pub const STALE_ORDER_WINDOW: Duration = Duration::from_secs(10 * 60);

/// How often the background sweeper scans for stale orders.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Fixed VND→USD conversion rate for the PayPal path. VND has no
/// subunit; the USD side must round to exactly 2 decimals.
pub const VND_PER_USD: u64 = 24_000;

/// Default currency for local providers.
pub const DEFAULT_CURRENCY: &str = "VND";

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

/// Read a required environment variable, failing closed when absent
/// or empty.
fn require_env(key: &str) -> Result<String, GatewayError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(GatewayError::Configuration(format!(
            "missing required environment variable: {}",
            key
        ))),
    }
}

fn require_secret(key: &str) -> Result<SecretString, GatewayError> {
    require_env(key).map(SecretString::new)
}

// ---------------------------------------------------------------------------
// Per-provider configuration
// ---------------------------------------------------------------------------

/// VNPay merchant configuration.
#[derive(Clone)]
pub struct VnpayConfig {
    /// Terminal/merchant code (`vnp_TmnCode`).
    pub tmn_code: String,
    /// HMAC-SHA512 hash secret.
    pub hash_secret: SecretString,
    /// Gateway pay endpoint (`.../paymentv2/vpcpay.html`).
    pub pay_url: String,
    /// Customer-facing return URL (`vnp_ReturnUrl`).
    pub return_url: String,
}

impl VnpayConfig {
    /// Reads `VNPAY_TMN_CODE`, `VNPAY_HASH_SECRET`, `VNPAY_URL`,
    /// `VNPAY_RETURN_URL`.
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            tmn_code: require_env("VNPAY_TMN_CODE")?,
            hash_secret: require_secret("VNPAY_HASH_SECRET")?,
            pay_url: require_env("VNPAY_URL")?,
            return_url: require_env("VNPAY_RETURN_URL")?,
        })
    }
}

/// Momo partner configuration.
#[derive(Clone)]
pub struct MomoConfig {
    pub partner_code: String,
    pub access_key: String,
    /// HMAC-SHA256 secret key.
    pub secret_key: SecretString,
    /// Order-creation endpoint.
    pub endpoint: String,
    /// Status-query endpoint.
    pub query_endpoint: String,
    /// Customer redirect URL.
    pub return_url: String,
    /// Server-to-server IPN URL.
    pub notify_url: String,
}

impl MomoConfig {
    /// Reads `MOMO_PARTNER_CODE`, `MOMO_ACCESS_KEY`, `MOMO_SECRET_KEY`,
    /// `MOMO_ENDPOINT`, `MOMO_QUERY_ENDPOINT`, `MOMO_RETURN_URL`,
    /// `MOMO_NOTIFY_URL`.
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            partner_code: require_env("MOMO_PARTNER_CODE")?,
            access_key: require_env("MOMO_ACCESS_KEY")?,
            secret_key: require_secret("MOMO_SECRET_KEY")?,
            endpoint: require_env("MOMO_ENDPOINT")?,
            query_endpoint: require_env("MOMO_QUERY_ENDPOINT")?,
            return_url: require_env("MOMO_RETURN_URL")?,
            notify_url: require_env("MOMO_NOTIFY_URL")?,
        })
    }
}

/// ZaloPay application configuration.
///
/// Two keys, two jobs: `key1` signs outbound order creation, `key2`
/// verifies inbound callbacks. Using the wrong one is a silent
/// verification bypass — the separation is enforced by the client and
/// tested explicitly.
#[derive(Clone)]
pub struct ZaloPayConfig {
    pub app_id: String,
    /// MAC key for order creation and status queries.
    pub key1: SecretString,
    /// MAC key for callback verification. Not interchangeable with key1.
    pub key2: SecretString,
    pub endpoint: String,
    pub query_endpoint: String,
    /// Redirect URL embedded in `embed_data`.
    pub callback_url: String,
}

impl ZaloPayConfig {
    /// Reads `ZALOPAY_APP_ID`, `ZALOPAY_KEY1`, `ZALOPAY_KEY2`,
    /// `ZALOPAY_ENDPOINT`, `ZALOPAY_QUERY_ENDPOINT`,
    /// `ZALOPAY_CALLBACK_URL`.
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            app_id: require_env("ZALOPAY_APP_ID")?,
            key1: require_secret("ZALOPAY_KEY1")?,
            key2: require_secret("ZALOPAY_KEY2")?,
            endpoint: require_env("ZALOPAY_ENDPOINT")?,
            query_endpoint: require_env("ZALOPAY_QUERY_ENDPOINT")?,
            callback_url: require_env("ZALOPAY_CALLBACK_URL")?,
        })
    }
}

/// Viettel Money partner configuration.
#[derive(Clone)]
pub struct ViettelConfig {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: SecretString,
    pub endpoint: String,
    pub callback_url: String,
}

impl ViettelConfig {
    /// Reads `VIETTELMONEY_PARTNER_CODE`, `VIETTELMONEY_ACCESS_KEY`,
    /// `VIETTELMONEY_SECRET_KEY`, `VIETTELMONEY_ENDPOINT`,
    /// `VIETTELMONEY_CALLBACK_URL`.
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            partner_code: require_env("VIETTELMONEY_PARTNER_CODE")?,
            access_key: require_env("VIETTELMONEY_ACCESS_KEY")?,
            secret_key: require_secret("VIETTELMONEY_SECRET_KEY")?,
            endpoint: require_env("VIETTELMONEY_ENDPOINT")?,
            callback_url: require_env("VIETTELMONEY_CALLBACK_URL")?,
        })
    }
}

/// PayPal REST configuration. OAuth, not HMAC — the odd one out.
#[derive(Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// `sandbox` or `live`; selects the API base URL.
    pub mode: PayPalMode,
    pub return_url: String,
    pub cancel_url: String,
}

/// Which PayPal environment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayPalMode {
    Sandbox,
    Live,
}

impl PayPalConfig {
    /// Reads `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`,
    /// `PAYPAL_RETURN_URL`, `PAYPAL_CANCEL_URL`, and optional
    /// `PAYPAL_MODE` (defaults to sandbox — the safe direction).
    pub fn from_env() -> Result<Self, GatewayError> {
        let mode = match std::env::var("PAYPAL_MODE").as_deref() {
            Ok("live") => PayPalMode::Live,
            _ => PayPalMode::Sandbox,
        };
        Ok(Self {
            client_id: require_env("PAYPAL_CLIENT_ID")?,
            client_secret: require_secret("PAYPAL_CLIENT_SECRET")?,
            mode,
            return_url: require_env("PAYPAL_RETURN_URL")?,
            cancel_url: require_env("PAYPAL_CANCEL_URL")?,
        })
    }

    /// API base URL for the configured mode.
    pub fn api_base(&self) -> &'static str {
        match self.mode {
            PayPalMode::Sandbox => "https://api-m.sandbox.paypal.com",
            PayPalMode::Live => "https://api-m.paypal.com",
        }
    }
}

/// Static bank-transfer details shown to the customer alongside the QR.
#[derive(Clone, Debug)]
pub struct BankTransferConfig {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

impl BankTransferConfig {
    /// Reads `BANK_NAME`, `BANK_ACCOUNT_NUMBER`, `BANK_ACCOUNT_NAME`.
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            bank_name: require_env("BANK_NAME")?,
            account_number: require_env("BANK_ACCOUNT_NUMBER")?,
            account_name: require_env("BANK_ACCOUNT_NAME")?,
        })
    }
}

/// The full provider configuration set, validated in one shot at boot.
#[derive(Clone)]
pub struct GatewaySettings {
    pub vnpay: VnpayConfig,
    pub momo: MomoConfig,
    pub zalopay: ZaloPayConfig,
    pub viettel: ViettelConfig,
    pub paypal: PayPalConfig,
    pub bank_transfer: BankTransferConfig,
}

impl GatewaySettings {
    /// Load every provider's configuration from the environment.
    ///
    /// Reports the *first* missing variable; operators fix one, rerun,
    /// and find the next. All providers are required — a deployment
    /// that wants fewer providers disables routes, not config.
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            vnpay: VnpayConfig::from_env()?,
            momo: MomoConfig::from_env()?,
            zalopay: ZaloPayConfig::from_env()?,
            viettel: ViettelConfig::from_env()?,
            paypal: PayPalConfig::from_env()?,
            bank_transfer: BankTransferConfig::from_env()?,
        })
    }
}
