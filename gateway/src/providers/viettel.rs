//! # Viettel Money
//!
//! HMAC-SHA256 over `k=v&…` strings in the partner-documented field
//! order, same family as Momo but with its own layout and an
//! integer-millisecond `requestTime` in the signed set.

use std::collections::BTreeMap;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::ViettelConfig;
use crate::error::GatewayError;
use crate::providers::{
    map_transport_error, now_millis, InitiateRequest, InitiatedPayment, VerifiedCallback,
};
use crate::signing::{self, HmacAlgorithm};
use crate::store::Provider;

pub const RESULT_SUCCESS: i64 = 0;

/// Signed-field order for the create request.
const CREATE_SIGN_ORDER: &[&str] = &[
    "partnerCode",
    "accessKey",
    "requestId",
    "amount",
    "orderId",
    "orderInfo",
    "returnUrl",
    "notifyUrl",
    "extraData",
    "requestTime",
];

/// Signed-field order for callbacks.
const CALLBACK_SIGN_ORDER: &[&str] = &["orderId", "resultCode", "message", "requestId"];

/// Inbound callback body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViettelCallback {
    pub order_id: String,
    pub result_code: i64,
    #[serde(default)]
    pub message: String,
    pub request_id: String,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub trans_id: Option<String>,
    pub signature: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    partner_code: &'a str,
    access_key: &'a str,
    request_id: &'a str,
    amount: u64,
    order_id: &'a str,
    order_info: &'a str,
    return_url: &'a str,
    notify_url: &'a str,
    extra_data: &'a str,
    request_time: i64,
    provider_code: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    result_code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    payment_url: Option<String>,
    #[serde(default)]
    qr_code_url: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

pub struct ViettelClient {
    config: ViettelConfig,
    http: reqwest::Client,
}

impl ViettelClient {
    pub fn new(config: ViettelConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn secret(&self) -> &[u8] {
        self.config.secret_key.expose_secret().as_bytes()
    }

    /// Sign and submit a payment creation request.
    pub async fn create_payment(
        &self,
        request: &InitiateRequest,
    ) -> Result<InitiatedPayment, GatewayError> {
        let request_id = format!("{}{}", self.config.partner_code, now_millis());
        let request_time = now_millis();
        let extra_data = request.extra_data.clone().unwrap_or_default();

        let mut fields = BTreeMap::new();
        fields.insert("partnerCode".to_string(), self.config.partner_code.clone());
        fields.insert("accessKey".to_string(), self.config.access_key.clone());
        fields.insert("requestId".to_string(), request_id.clone());
        fields.insert("amount".to_string(), request.amount.to_string());
        fields.insert("orderId".to_string(), request.order_number.clone());
        fields.insert("orderInfo".to_string(), request.order_info.clone());
        fields.insert("returnUrl".to_string(), self.config.callback_url.clone());
        fields.insert("notifyUrl".to_string(), self.config.callback_url.clone());
        fields.insert("extraData".to_string(), extra_data.clone());
        fields.insert("requestTime".to_string(), request_time.to_string());

        let raw = signing::fixed_order_query(&fields, CREATE_SIGN_ORDER)?;
        let signature = signing::sign_hex(HmacAlgorithm::Sha256, self.secret(), raw.as_bytes());

        let body = CreateRequest {
            partner_code: &self.config.partner_code,
            access_key: &self.config.access_key,
            request_id: &request_id,
            amount: request.amount,
            order_id: &request.order_number,
            order_info: &request.order_info,
            return_url: &self.config.callback_url,
            notify_url: &self.config.callback_url,
            extra_data: &extra_data,
            request_time,
            provider_code: "viettelmoney",
            signature,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("viettel_money", e))?;

        let raw_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_transport_error("viettel_money", e))?;
        let parsed: CreateResponse =
            serde_json::from_value(raw_body.clone()).map_err(|e| GatewayError::Protocol {
                provider: "viettel_money",
                detail: format!("create response: {e}"),
            })?;

        if parsed.result_code != RESULT_SUCCESS {
            return Err(GatewayError::PaymentDeclined {
                provider: "viettel_money",
                code: parsed.result_code.to_string(),
                message: parsed.message,
            });
        }

        Ok(InitiatedPayment {
            provider: Provider::ViettelMoney,
            provider_request_id: parsed.request_id.or(Some(request_id)),
            pay_url: parsed.payment_url,
            deeplink: None,
            qr_payload: parsed.qr_code_url,
            raw: raw_body,
        })
    }

    /// Verify a callback against its embedded signature.
    pub fn verify_callback(
        &self,
        cb: &ViettelCallback,
    ) -> Result<VerifiedCallback, GatewayError> {
        let mut fields = BTreeMap::new();
        fields.insert("orderId".to_string(), cb.order_id.clone());
        fields.insert("resultCode".to_string(), cb.result_code.to_string());
        fields.insert("message".to_string(), cb.message.clone());
        fields.insert("requestId".to_string(), cb.request_id.clone());

        let raw = signing::fixed_order_query(&fields, CALLBACK_SIGN_ORDER)?;
        let valid =
            signing::verify_hex(HmacAlgorithm::Sha256, self.secret(), raw.as_bytes(), &cb.signature);
        if !valid {
            return Err(GatewayError::SignatureInvalid {
                provider: "viettel_money",
            });
        }

        Ok(VerifiedCallback {
            order_number: cb.order_id.clone(),
            amount: cb.amount,
            provider_transaction_id: cb.trans_id.clone(),
            success: cb.result_code == RESULT_SUCCESS,
            result_code: cb.result_code.to_string(),
            message: (!cb.message.is_empty()).then(|| cb.message.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn client() -> ViettelClient {
        ViettelClient::new(
            ViettelConfig {
                partner_code: "VTPARTNER".into(),
                access_key: "vtaccesskey".into(),
                secret_key: SecretString::new("vttestsecret00000000000000000000".into()),
                endpoint: "https://sandbox.viettel.vn/payment/create".into(),
                callback_url: "http://localhost:5000/api/viettelmoney/callback".into(),
            },
            reqwest::Client::new(),
        )
    }

    fn gateway_sign(client: &ViettelClient, cb: &ViettelCallback) -> String {
        let raw = format!(
            "orderId={}&resultCode={}&message={}&requestId={}",
            cb.order_id, cb.result_code, cb.message, cb.request_id
        );
        signing::sign_hex(HmacAlgorithm::Sha256, client.secret(), raw.as_bytes())
    }

    fn callback(result_code: i64) -> ViettelCallback {
        ViettelCallback {
            order_id: "HD12345678".into(),
            result_code,
            message: "Success".into(),
            request_id: "VTPARTNER1756500000000".into(),
            amount: Some(750_000),
            trans_id: Some("VT998877".into()),
            signature: String::new(),
        }
    }

    // 1. A correctly signed success callback verifies.
    #[test]
    fn valid_callback_verifies() {
        let client = client();
        let mut cb = callback(0);
        cb.signature = gateway_sign(&client, &cb);

        let verified = client.verify_callback(&cb).unwrap();
        assert!(verified.success);
        assert_eq!(verified.order_number, "HD12345678");
        assert_eq!(verified.amount, Some(750_000));
        assert_eq!(verified.provider_transaction_id.as_deref(), Some("VT998877"));
    }

    // 2. Amount is NOT in the signed set, so the cross-check against
    //    the stored order is the only defense; the signature here only
    //    binds identity and outcome.
    #[test]
    fn tampered_result_code_is_rejected() {
        let client = client();
        let mut cb = callback(97);
        cb.signature = gateway_sign(&client, &cb);
        cb.result_code = 0;

        assert!(matches!(
            client.verify_callback(&cb).unwrap_err(),
            GatewayError::SignatureInvalid { .. }
        ));
    }

    // 3. Non-zero result code verifies as a declined payment.
    #[test]
    fn declined_callback_verifies_as_failure() {
        let client = client();
        let mut cb = callback(11);
        cb.message = "Insufficient balance".into();
        cb.signature = gateway_sign(&client, &cb);

        let verified = client.verify_callback(&cb).unwrap();
        assert!(!verified.success);
        assert_eq!(verified.result_code, "11");
        assert_eq!(verified.message.as_deref(), Some("Insufficient balance"));
    }

    // 4. Create signature order starts with partnerCode, not accessKey.
    #[test]
    fn create_sign_order_matches_protocol() {
        let mut fields = BTreeMap::new();
        for key in CREATE_SIGN_ORDER {
            fields.insert((*key).to_string(), format!("v_{key}"));
        }
        let raw = signing::fixed_order_query(&fields, CREATE_SIGN_ORDER).unwrap();
        assert!(raw.starts_with("partnerCode=v_partnerCode&accessKey=v_accessKey"));
        assert!(raw.ends_with("requestTime=v_requestTime"));
    }
}
