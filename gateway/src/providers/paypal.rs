//! # PayPal
//!
//! The one non-HMAC provider: OAuth2 client-credentials bearer tokens
//! against the REST v2 checkout API. Store prices are VND; PayPal
//! charges USD, converted at the fixed [`VND_PER_USD`] rate and
//! rounded to two decimals.
//!
//! [`VND_PER_USD`]: crate::config::VND_PER_USD

use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::{PayPalConfig, VND_PER_USD};
use crate::error::GatewayError;
use crate::providers::map_transport_error;
use crate::store::Provider;

/// Order status value meaning the funds were captured.
pub const STATUS_COMPLETED: &str = "COMPLETED";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
}

/// Result of creating a PayPal checkout order.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    /// PayPal-side order id, used for capture and lookup.
    pub paypal_order_id: String,
    /// Where to send the customer to approve the payment.
    pub approve_url: String,
    /// Charged USD amount as sent on the wire.
    pub usd_value: String,
    pub raw: serde_json::Value,
}

/// Result of capturing an approved order.
#[derive(Debug, Clone)]
pub struct CapturedOrder {
    pub paypal_order_id: String,
    /// True only when PayPal reports `COMPLETED`.
    pub completed: bool,
    pub status: String,
    pub raw: serde_json::Value,
}

/// Convert whole VND to a two-decimal USD string at the fixed rate.
pub fn vnd_to_usd(amount_vnd: u64) -> String {
    format!("{:.2}", amount_vnd as f64 / VND_PER_USD as f64)
}

pub struct PayPalClient {
    config: PayPalConfig,
    http: reqwest::Client,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn provider(&self) -> Provider {
        Provider::Paypal
    }

    /// Fetch a bearer token. Tokens are requested per call; PayPal
    /// rate limits are far above a storefront's checkout volume.
    async fn access_token(&self) -> Result<String, GatewayError> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.api_base()))
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| map_transport_error("paypal", e))?;

        if !response.status().is_success() {
            return Err(GatewayError::Protocol {
                provider: "paypal",
                detail: format!("token endpoint returned {}", response.status()),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error("paypal", e))?;
        Ok(token.access_token)
    }

    /// Create a CAPTURE-intent order for a VND-priced purchase.
    pub async fn create_order(
        &self,
        order_number: &str,
        amount_vnd: u64,
        description: &str,
    ) -> Result<CreatedOrder, GatewayError> {
        let token = self.access_token().await?;
        let usd_value = vnd_to_usd(amount_vnd);

        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": order_number,
                "description": description,
                "amount": {
                    "currency_code": "USD",
                    "value": usd_value,
                }
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.cancel_url,
                "landing_page": "BILLING",
                "user_action": "PAY_NOW",
            }
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.config.api_base()))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("paypal", e))?;

        let status = response.status();
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_transport_error("paypal", e))?;

        if !status.is_success() {
            return Err(GatewayError::PaymentDeclined {
                provider: "paypal",
                code: status.as_u16().to_string(),
                message: raw
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from),
            });
        }

        let parsed: OrderResponse =
            serde_json::from_value(raw.clone()).map_err(|e| GatewayError::Protocol {
                provider: "paypal",
                detail: format!("order response: {e}"),
            })?;

        let approve_url = parsed
            .links
            .iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href.clone())
            .ok_or(GatewayError::Protocol {
                provider: "paypal",
                detail: "no approve link in order response".to_string(),
            })?;

        Ok(CreatedOrder {
            paypal_order_id: parsed.id,
            approve_url,
            usd_value,
            raw,
        })
    }

    /// Capture an approved order. `completed` is authoritative; any
    /// other status is a pending/failed capture the caller must not
    /// treat as paid.
    pub async fn capture_order(&self, paypal_order_id: &str) -> Result<CapturedOrder, GatewayError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.config.api_base(),
                paypal_order_id
            ))
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| map_transport_error("paypal", e))?;

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_transport_error("paypal", e))?;

        let parsed: OrderResponse =
            serde_json::from_value(raw.clone()).map_err(|e| GatewayError::Protocol {
                provider: "paypal",
                detail: format!("capture response: {e}"),
            })?;

        let status = parsed.status.unwrap_or_else(|| "UNKNOWN".to_string());
        Ok(CapturedOrder {
            paypal_order_id: parsed.id,
            completed: status == STATUS_COMPLETED,
            status,
            raw,
        })
    }

    /// Fetch the current state of an order.
    pub async fn get_order(&self, paypal_order_id: &str) -> Result<serde_json::Value, GatewayError> {
        let token = self.access_token().await?;

        self.http
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.config.api_base(),
                paypal_order_id
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| map_transport_error("paypal", e))?
            .json()
            .await
            .map_err(|e| map_transport_error("paypal", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fixed-rate conversion, rounded to cents on the wire.
    #[test]
    fn vnd_converts_at_the_fixed_rate() {
        assert_eq!(vnd_to_usd(24_000), "1.00");
        assert_eq!(vnd_to_usd(1_500_000), "62.50");
        assert_eq!(vnd_to_usd(100_000), "4.17");
        assert_eq!(vnd_to_usd(0), "0.00");
    }

    #[test]
    fn approve_link_is_selected_by_rel() {
        let raw = serde_json::json!({
            "id": "5O190127TN364715T",
            "status": "CREATED",
            "links": [
                {"rel": "self", "href": "https://api-m.sandbox.paypal.com/v2/checkout/orders/5O190127TN364715T", "method": "GET"},
                {"rel": "approve", "href": "https://www.sandbox.paypal.com/checkoutnow?token=5O190127TN364715T", "method": "GET"}
            ]
        });
        let parsed: OrderResponse = serde_json::from_value(raw).unwrap();
        let approve = parsed.links.iter().find(|l| l.rel == "approve").unwrap();
        assert!(approve.href.contains("checkoutnow"));
    }

    #[test]
    fn capture_status_must_be_completed() {
        let raw = serde_json::json!({ "id": "X", "status": "PENDING" });
        let parsed: OrderResponse = serde_json::from_value(raw).unwrap();
        assert_ne!(parsed.status.as_deref(), Some(STATUS_COMPLETED));
    }
}
