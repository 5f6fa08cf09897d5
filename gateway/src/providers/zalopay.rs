//! # ZaloPay
//!
//! Form-encoded API with two HMAC keys and strict key separation:
//! **key1** signs everything we send (create, query), **key2** verifies
//! everything ZaloPay sends us (callbacks). The callback mac covers the
//! raw `data` string exactly as transmitted; it must be verified before
//! the JSON inside is parsed.
//!
//! Macs are HMAC-SHA256 over pipe-joined values, no keys, no encoding.

use std::collections::BTreeMap;

use chrono::{FixedOffset, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::ZaloPayConfig;
use crate::error::GatewayError;
use crate::providers::{
    map_transport_error, now_millis, InitiateRequest, InitiatedPayment, VerifiedCallback,
};
use crate::signing::{self, HmacAlgorithm};
use crate::store::Provider;

/// `return_code` for a successful create/query.
pub const RETURN_SUCCESS: i64 = 1;

/// Value order for the create-order mac.
const CREATE_MAC_ORDER: &[&str] = &[
    "app_id",
    "app_trans_id",
    "app_user",
    "amount",
    "app_time",
    "embed_data",
    "item",
];

/// `app_trans_id` dates use Indochina wall-clock time.
const VN_OFFSET_SECS: i32 = 7 * 3600;

const APP_USER: &str = "customer";

/// Inbound callback envelope: a raw JSON string plus its mac.
#[derive(Debug, Clone, Deserialize)]
pub struct ZaloPayCallback {
    /// Raw JSON payload, verified as an opaque string.
    pub data: String,
    pub mac: String,
    #[serde(rename = "type", default)]
    pub callback_type: Option<i64>,
}

/// Payload inside the verified `data` string.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackData {
    pub app_trans_id: String,
    pub amount: u64,
    #[serde(default)]
    pub zp_trans_id: Option<i64>,
    /// 1 = paid. Absent on older payloads, where delivery itself
    /// implies success.
    #[serde(default)]
    pub status: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    #[serde(default)]
    sub_return_message: Option<String>,
    #[serde(default)]
    order_url: Option<String>,
    #[serde(default)]
    qr_code: Option<String>,
}

pub struct ZaloPayClient {
    config: ZaloPayConfig,
    http: reqwest::Client,
}

impl ZaloPayClient {
    pub fn new(config: ZaloPayConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// `YYMMDD_orderNumber`: ZaloPay requires the prefix to match the
    /// creation date in GMT+7, and the suffix is ours to correlate on.
    pub fn app_trans_id(&self, order_number: &str) -> String {
        let offset = FixedOffset::east_opt(VN_OFFSET_SECS)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        let prefix = Utc::now().with_timezone(&offset).format("%y%m%d");
        format!("{prefix}_{order_number}")
    }

    /// Recover our order number from an `app_trans_id`.
    pub fn order_number_of(app_trans_id: &str) -> Result<&str, GatewayError> {
        app_trans_id
            .split_once('_')
            .map(|(_, rest)| rest)
            .filter(|rest| !rest.is_empty())
            .ok_or(GatewayError::Protocol {
                provider: "zalopay",
                detail: format!("malformed app_trans_id: {app_trans_id}"),
            })
    }

    /// Create an order; the mac is computed with **key1** over the
    /// pipe-joined values, with `embed_data` and `item` participating
    /// as their JSON-stringified forms.
    pub async fn create_order(
        &self,
        request: &InitiateRequest,
    ) -> Result<InitiatedPayment, GatewayError> {
        let app_trans_id = self.app_trans_id(&request.order_number);
        let app_time = now_millis();

        let embed_data =
            serde_json::to_string(&serde_json::json!({ "redirecturl": self.config.callback_url }))?;
        let item = match &request.items {
            Some(items) => serde_json::to_string(items)?,
            None => "[]".to_string(),
        };

        let mut mac_fields = BTreeMap::new();
        mac_fields.insert("app_id".to_string(), self.config.app_id.clone());
        mac_fields.insert("app_trans_id".to_string(), app_trans_id.clone());
        mac_fields.insert("app_user".to_string(), APP_USER.to_string());
        mac_fields.insert("amount".to_string(), request.amount.to_string());
        mac_fields.insert("app_time".to_string(), app_time.to_string());
        mac_fields.insert("embed_data".to_string(), embed_data.clone());
        mac_fields.insert("item".to_string(), item.clone());

        let mac_payload = signing::pipe_joined(&mac_fields, CREATE_MAC_ORDER)?;
        let mac = signing::sign_hex(
            HmacAlgorithm::Sha256,
            self.config.key1.expose_secret().as_bytes(),
            mac_payload.as_bytes(),
        );

        let form: Vec<(&str, String)> = vec![
            ("app_id", self.config.app_id.clone()),
            ("app_trans_id", app_trans_id.clone()),
            ("app_user", APP_USER.to_string()),
            ("app_time", app_time.to_string()),
            ("amount", request.amount.to_string()),
            ("item", item),
            ("embed_data", embed_data),
            ("description", request.order_info.clone()),
            (
                "bank_code",
                request.bank_code.clone().unwrap_or_default(),
            ),
            ("mac", mac),
        ];

        let response = self
            .http
            .post(&self.config.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| map_transport_error("zalopay", e))?;

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_transport_error("zalopay", e))?;
        let parsed: CreateResponse =
            serde_json::from_value(raw.clone()).map_err(|e| GatewayError::Protocol {
                provider: "zalopay",
                detail: format!("create response: {e}"),
            })?;

        if parsed.return_code != RETURN_SUCCESS {
            return Err(GatewayError::PaymentDeclined {
                provider: "zalopay",
                code: parsed.return_code.to_string(),
                message: parsed.sub_return_message.or(Some(parsed.return_message)),
            });
        }

        Ok(InitiatedPayment {
            provider: Provider::Zalopay,
            provider_request_id: Some(app_trans_id),
            pay_url: parsed.order_url,
            deeplink: None,
            qr_payload: parsed.qr_code,
            raw,
        })
    }

    /// Verify a callback: **key2** mac over the untouched `data`
    /// string, then parse the JSON inside.
    pub fn verify_callback(
        &self,
        callback: &ZaloPayCallback,
    ) -> Result<VerifiedCallback, GatewayError> {
        let valid = signing::verify_hex(
            HmacAlgorithm::Sha256,
            self.config.key2.expose_secret().as_bytes(),
            callback.data.as_bytes(),
            &callback.mac,
        );
        if !valid {
            return Err(GatewayError::SignatureInvalid {
                provider: "zalopay",
            });
        }

        let data: CallbackData =
            serde_json::from_str(&callback.data).map_err(|e| GatewayError::Protocol {
                provider: "zalopay",
                detail: format!("callback data: {e}"),
            })?;

        let order_number = Self::order_number_of(&data.app_trans_id)?.to_string();
        let success = data.status.map_or(true, |s| s == 1);

        Ok(VerifiedCallback {
            order_number,
            amount: Some(data.amount),
            provider_transaction_id: data.zp_trans_id.map(|id| id.to_string()),
            success,
            result_code: data
                .status
                .map_or_else(|| "1".to_string(), |s| s.to_string()),
            message: None,
        })
    }

    /// Query order status. The mac covers `app_id|app_trans_id|key1`,
    /// with key1 appearing both inside the payload and as the HMAC key.
    pub async fn query(&self, app_trans_id: &str) -> Result<serde_json::Value, GatewayError> {
        let key1 = self.config.key1.expose_secret();
        let payload = format!("{}|{}|{}", self.config.app_id, app_trans_id, key1);
        let mac = signing::sign_hex(HmacAlgorithm::Sha256, key1.as_bytes(), payload.as_bytes());

        let form: Vec<(&str, String)> = vec![
            ("app_id", self.config.app_id.clone()),
            ("app_trans_id", app_trans_id.to_string()),
            ("mac", mac),
        ];

        self.http
            .post(&self.config.query_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| map_transport_error("zalopay", e))?
            .json()
            .await
            .map_err(|e| map_transport_error("zalopay", e))
    }
}
