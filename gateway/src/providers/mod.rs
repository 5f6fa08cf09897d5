//! # Payment Providers
//!
//! One client per gateway, each owning its configuration and signing
//! discipline. The shared vocabulary lives here; the wire formats live
//! in the per-provider modules.
//!
//! | Module | Gateway | Signature |
//! |--------|---------|-----------|
//! | `vnpay` | VNPay redirect | HMAC-SHA512, sorted encoded query |
//! | `momo` | Momo wallet | HMAC-SHA256, fixed field order |
//! | `zalopay` | ZaloPay | HMAC-SHA256, pipe-joined, key1/key2 |
//! | `viettel` | Viettel Money | HMAC-SHA256, fixed field order |
//! | `paypal` | PayPal REST | OAuth2 bearer, no HMAC |
//! | `local` | Bank transfer / COD | none (no network) |

pub mod local;
pub mod momo;
pub mod paypal;
pub mod viettel;
pub mod vnpay;
pub mod zalopay;

use serde::{Deserialize, Serialize};

use crate::config::GATEWAY_HTTP_TIMEOUT;
use crate::error::GatewayError;
use crate::store::Provider;

/// What the checkout flow asks of a provider, independent of which
/// gateway ends up serving it.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateRequest {
    /// Merchant order reference (`HD…`), the transfer memo everywhere.
    pub order_number: String,
    /// Amount in whole VND.
    pub amount: u64,
    /// Human-readable description shown on the gateway page.
    pub order_info: String,
    /// Client IP, required by VNPay.
    #[serde(default)]
    pub client_ip: Option<String>,
    /// Preselected bank, VNPay and ZaloPay honor it.
    #[serde(default)]
    pub bank_code: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    /// Cart line items, forwarded opaquely where the gateway takes them.
    #[serde(default)]
    pub items: Option<serde_json::Value>,
    #[serde(default)]
    pub extra_data: Option<String>,
}

/// Result of initiating a payment with a provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedPayment {
    pub provider: Provider,
    /// Provider-side request reference, needed later for queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_request_id: Option<String>,
    /// Redirect target for the customer, when the flow is redirect-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_url: Option<String>,
    /// App deeplink, wallet providers only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deeplink: Option<String>,
    /// QR payload for scan-to-pay flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payload: Option<String>,
    /// Full provider response, passed through for the frontend.
    pub raw: serde_json::Value,
}

/// A callback/IPN whose signature has already been verified.
///
/// Only verified data crosses this boundary; routes act on this type,
/// never on raw inbound parameters.
#[derive(Debug, Clone)]
pub struct VerifiedCallback {
    pub order_number: String,
    /// Amount in whole VND as reported by the gateway, when present.
    pub amount: Option<u64>,
    pub provider_transaction_id: Option<String>,
    pub success: bool,
    pub result_code: String,
    pub message: Option<String>,
}

/// Shared outbound HTTP client with the bounded gateway timeout.
pub fn http_client() -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(GATEWAY_HTTP_TIMEOUT)
        .build()
        .map_err(|e| GatewayError::Configuration(format!("http client: {e}")))
}

/// Map an outbound request failure onto the error taxonomy: timeouts
/// and connect errors are retryable, everything else is a protocol
/// fault on the named provider.
pub(crate) fn map_transport_error(provider: &'static str, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() || err.is_connect() {
        GatewayError::GatewayUnavailable(format!("{provider}: {err}"))
    } else {
        GatewayError::Protocol {
            provider,
            detail: err.to_string(),
        }
    }
}

/// Milliseconds since the Unix epoch, the timestamp unit every
/// Vietnamese gateway speaks.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
