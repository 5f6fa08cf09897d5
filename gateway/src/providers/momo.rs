//! # Momo
//!
//! Wallet gateway with a JSON API. Every message carries an
//! HMAC-SHA256 over a `k=v&…` string whose field membership and order
//! are fixed per message type by Momo's protocol — not sorted, not
//! derived from the payload. `accessKey` and `partnerCode` in the
//! signed string always come from our own configuration, never from
//! inbound data.

use std::collections::BTreeMap;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::MomoConfig;
use crate::error::GatewayError;
use crate::providers::{
    map_transport_error, now_millis, InitiateRequest, InitiatedPayment, VerifiedCallback,
};
use crate::signing::{self, HmacAlgorithm};
use crate::store::Provider;

/// Result code Momo uses for success in every message type.
pub const RESULT_SUCCESS: i64 = 0;

/// Signed-field order for the create-order request.
const CREATE_SIGN_ORDER: &[&str] = &[
    "accessKey",
    "amount",
    "extraData",
    "ipnUrl",
    "orderId",
    "orderInfo",
    "partnerCode",
    "redirectUrl",
    "requestId",
    "requestType",
];

/// Signed-field order for callbacks and IPNs.
const CALLBACK_SIGN_ORDER: &[&str] = &[
    "accessKey",
    "amount",
    "extraData",
    "message",
    "orderId",
    "orderInfo",
    "orderType",
    "partnerCode",
    "payType",
    "requestId",
    "responseTime",
    "resultCode",
    "transId",
];

/// Signed-field order for the status query.
const QUERY_SIGN_ORDER: &[&str] = &["accessKey", "orderId", "partnerCode", "requestId"];

const REQUEST_TYPE: &str = "captureWallet";

/// Inbound callback/IPN body. Momo sends the same shape to the
/// redirect callback (as query parameters) and the IPN endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomoCallback {
    pub partner_code: String,
    pub order_id: String,
    pub request_id: String,
    pub amount: u64,
    #[serde(default)]
    pub order_info: String,
    #[serde(default)]
    pub order_type: String,
    pub trans_id: u64,
    pub result_code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub pay_type: String,
    pub response_time: u64,
    #[serde(default)]
    pub extra_data: String,
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
    redirect_url: &'a str,
    ipn_url: &'a str,
    extra_data: &'a str,
    request_type: &'a str,
    signature: String,
    lang: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    result_code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    pay_url: Option<String>,
    #[serde(default)]
    deeplink: Option<String>,
    #[serde(default)]
    qr_code_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    partner_code: &'a str,
    access_key: &'a str,
    request_id: &'a str,
    order_id: &'a str,
    signature: String,
    lang: &'a str,
}

pub struct MomoClient {
    config: MomoConfig,
    http: reqwest::Client,
}

impl MomoClient {
    pub fn new(config: MomoConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn sign(&self, fields: &BTreeMap<String, String>, order: &[&str]) -> Result<String, GatewayError> {
        let raw = signing::fixed_order_query(fields, order)?;
        Ok(signing::sign_hex(
            HmacAlgorithm::Sha256,
            self.config.secret_key.expose_secret().as_bytes(),
            raw.as_bytes(),
        ))
    }

    /// Create a wallet payment and return the pay URL / deeplink / QR.
    ///
    /// A fresh `requestId` is generated per attempt; a non-zero
    /// `resultCode` in the response is a decline, not a transport
    /// failure.
    pub async fn create_payment(
        &self,
        request: &InitiateRequest,
    ) -> Result<InitiatedPayment, GatewayError> {
        let request_id = format!("{}{}", self.config.partner_code, now_millis());
        let extra_data = request.extra_data.clone().unwrap_or_default();

        let mut fields = BTreeMap::new();
        fields.insert("accessKey".to_string(), self.config.access_key.clone());
        fields.insert("amount".to_string(), request.amount.to_string());
        fields.insert("extraData".to_string(), extra_data.clone());
        fields.insert("ipnUrl".to_string(), self.config.notify_url.clone());
        fields.insert("orderId".to_string(), request.order_number.clone());
        fields.insert("orderInfo".to_string(), request.order_info.clone());
        fields.insert("partnerCode".to_string(), self.config.partner_code.clone());
        fields.insert("redirectUrl".to_string(), self.config.return_url.clone());
        fields.insert("requestId".to_string(), request_id.clone());
        fields.insert("requestType".to_string(), REQUEST_TYPE.to_string());

        let signature = self.sign(&fields, CREATE_SIGN_ORDER)?;

        let body = CreateRequest {
            partner_code: &self.config.partner_code,
            access_key: &self.config.access_key,
            request_id: &request_id,
            amount: request.amount,
            order_id: &request.order_number,
            order_info: &request.order_info,
            redirect_url: &self.config.return_url,
            ipn_url: &self.config.notify_url,
            extra_data: &extra_data,
            request_type: REQUEST_TYPE,
            signature,
            lang: "vi",
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("momo", e))?;

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_transport_error("momo", e))?;
        let parsed: CreateResponse =
            serde_json::from_value(raw.clone()).map_err(|e| GatewayError::Protocol {
                provider: "momo",
                detail: format!("create response: {e}"),
            })?;

        if parsed.result_code != RESULT_SUCCESS {
            return Err(GatewayError::PaymentDeclined {
                provider: "momo",
                code: parsed.result_code.to_string(),
                message: parsed.message,
            });
        }

        Ok(InitiatedPayment {
            provider: Provider::Momo,
            provider_request_id: Some(request_id),
            pay_url: parsed.pay_url,
            deeplink: parsed.deeplink,
            qr_payload: parsed.qr_code_url,
            raw,
        })
    }

    /// Verify a callback/IPN body against its embedded signature.
    pub fn verify_callback(&self, cb: &MomoCallback) -> Result<VerifiedCallback, GatewayError> {
        let mut fields = BTreeMap::new();
        fields.insert("accessKey".to_string(), self.config.access_key.clone());
        fields.insert("amount".to_string(), cb.amount.to_string());
        fields.insert("extraData".to_string(), cb.extra_data.clone());
        fields.insert("message".to_string(), cb.message.clone());
        fields.insert("orderId".to_string(), cb.order_id.clone());
        fields.insert("orderInfo".to_string(), cb.order_info.clone());
        fields.insert("orderType".to_string(), cb.order_type.clone());
        fields.insert("partnerCode".to_string(), self.config.partner_code.clone());
        fields.insert("payType".to_string(), cb.pay_type.clone());
        fields.insert("requestId".to_string(), cb.request_id.clone());
        fields.insert("responseTime".to_string(), cb.response_time.to_string());
        fields.insert("resultCode".to_string(), cb.result_code.to_string());
        fields.insert("transId".to_string(), cb.trans_id.to_string());

        let raw = signing::fixed_order_query(&fields, CALLBACK_SIGN_ORDER)?;
        let valid = signing::verify_hex(
            HmacAlgorithm::Sha256,
            self.config.secret_key.expose_secret().as_bytes(),
            raw.as_bytes(),
            &cb.signature,
        );
        if !valid {
            return Err(GatewayError::SignatureInvalid { provider: "momo" });
        }

        Ok(VerifiedCallback {
            order_number: cb.order_id.clone(),
            amount: Some(cb.amount),
            provider_transaction_id: Some(cb.trans_id.to_string()),
            success: cb.result_code == RESULT_SUCCESS,
            result_code: cb.result_code.to_string(),
            message: (!cb.message.is_empty()).then(|| cb.message.clone()),
        })
    }

    /// Query the gateway-side status of an order.
    pub async fn query(
        &self,
        order_number: &str,
        request_id: &str,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut fields = BTreeMap::new();
        fields.insert("accessKey".to_string(), self.config.access_key.clone());
        fields.insert("orderId".to_string(), order_number.to_string());
        fields.insert("partnerCode".to_string(), self.config.partner_code.clone());
        fields.insert("requestId".to_string(), request_id.to_string());

        let signature = self.sign(&fields, QUERY_SIGN_ORDER)?;

        let body = QueryRequest {
            partner_code: &self.config.partner_code,
            access_key: &self.config.access_key,
            request_id,
            order_id: order_number,
            signature,
            lang: "vi",
        };

        self.http
            .post(&self.config.query_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("momo", e))?
            .json()
            .await
            .map_err(|e| map_transport_error("momo", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn client() -> MomoClient {
        MomoClient::new(
            MomoConfig {
                partner_code: "MOMOTEST".into(),
                access_key: "testaccesskey".into(),
                secret_key: SecretString::new("momotestsecretkey000000000000000".into()),
                endpoint: "https://test-payment.momo.vn/v2/gateway/api/create".into(),
                query_endpoint: "https://test-payment.momo.vn/v2/gateway/api/query".into(),
                return_url: "http://localhost:3000/payment/momo/callback".into(),
                notify_url: "http://localhost:5000/api/momo/notify".into(),
            },
            reqwest::Client::new(),
        )
    }

    /// Sign a callback body the way the gateway would.
    fn gateway_sign(client: &MomoClient, cb: &MomoCallback) -> String {
        let raw = format!(
            "accessKey={}&amount={}&extraData={}&message={}&orderId={}&orderInfo={}&orderType={}&partnerCode={}&payType={}&requestId={}&responseTime={}&resultCode={}&transId={}",
            client.config.access_key,
            cb.amount,
            cb.extra_data,
            cb.message,
            cb.order_id,
            cb.order_info,
            cb.order_type,
            client.config.partner_code,
            cb.pay_type,
            cb.request_id,
            cb.response_time,
            cb.result_code,
            cb.trans_id,
        );
        signing::sign_hex(
            HmacAlgorithm::Sha256,
            client.config.secret_key.expose_secret().as_bytes(),
            raw.as_bytes(),
        )
    }

    fn callback(result_code: i64) -> MomoCallback {
        MomoCallback {
            partner_code: "MOMOTEST".into(),
            order_id: "HD12345678".into(),
            request_id: "MOMOTEST1756500000000".into(),
            amount: 1_500_000,
            order_info: "Thanh toan don hang HD12345678".into(),
            order_type: "momo_wallet".into(),
            trans_id: 2_547_890_123,
            result_code,
            message: "Successful.".into(),
            pay_type: "qr".into(),
            response_time: 1_756_500_060_000,
            extra_data: String::new(),
            signature: String::new(),
        }
    }

    // 1. A gateway-signed success callback verifies.
    #[test]
    fn valid_callback_verifies() {
        let client = client();
        let mut cb = callback(0);
        cb.signature = gateway_sign(&client, &cb);

        let verified = client.verify_callback(&cb).unwrap();
        assert!(verified.success);
        assert_eq!(verified.order_number, "HD12345678");
        assert_eq!(verified.amount, Some(1_500_000));
        assert_eq!(
            verified.provider_transaction_id.as_deref(),
            Some("2547890123")
        );
    }

    // 2. Changing the amount after signing invalidates the signature.
    #[test]
    fn tampered_amount_is_rejected() {
        let client = client();
        let mut cb = callback(0);
        cb.signature = gateway_sign(&client, &cb);
        cb.amount = 1;

        assert!(matches!(
            client.verify_callback(&cb).unwrap_err(),
            GatewayError::SignatureInvalid { provider: "momo" }
        ));
    }

    // 3. A user-cancelled payment (resultCode 1006) verifies as a
    //    failure, not an error.
    #[test]
    fn declined_callback_verifies_as_failure() {
        let client = client();
        let mut cb = callback(1006);
        cb.message = "Transaction denied by user.".into();
        cb.signature = gateway_sign(&client, &cb);

        let verified = client.verify_callback(&cb).unwrap();
        assert!(!verified.success);
        assert_eq!(verified.result_code, "1006");
    }

    // 4. The signed string for create-order uses the documented
    //    field order, not alphabetical-by-accident.
    #[test]
    fn create_sign_order_matches_protocol() {
        let mut fields = BTreeMap::new();
        for key in CREATE_SIGN_ORDER {
            fields.insert((*key).to_string(), format!("v_{key}"));
        }
        let raw = signing::fixed_order_query(&fields, CREATE_SIGN_ORDER).unwrap();
        assert!(raw.starts_with("accessKey=v_accessKey&amount=v_amount"));
        assert!(raw.ends_with("requestType=v_requestType"));
    }

    // 5. A callback signed with someone else's secret is rejected.
    #[test]
    fn foreign_secret_is_rejected() {
        let client = client();
        let mut cb = callback(0);
        let raw = format!("accessKey={}&amount={}", client.config.access_key, cb.amount);
        cb.signature =
            signing::sign_hex(HmacAlgorithm::Sha256, b"wrong-secret", raw.as_bytes());

        assert!(matches!(
            client.verify_callback(&cb).unwrap_err(),
            GatewayError::SignatureInvalid { .. }
        ));
    }
}
