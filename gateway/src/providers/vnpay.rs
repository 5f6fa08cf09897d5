//! # VNPay
//!
//! Redirect-based gateway. The payment "request" is a signed URL the
//! customer is sent to; confirmation comes back twice, as a browser
//! return (GET) and a server-to-server IPN (POST), both carrying the
//! same signed parameter set.
//!
//! Signature: HMAC-SHA512 over the alphabetically sorted,
//! percent-encoded query string, delivered in `vnp_SecureHash`.

use std::collections::BTreeMap;

use chrono::{FixedOffset, Utc};
use secrecy::ExposeSecret;

use crate::config::VnpayConfig;
use crate::error::GatewayError;
use crate::providers::{InitiateRequest, InitiatedPayment, VerifiedCallback};
use crate::signing::{self, HmacAlgorithm};
use crate::store::Provider;

/// VNPay timestamps are wall-clock Indochina time (UTC+7).
const VN_OFFSET_SECS: i32 = 7 * 3600;
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Response code VNPay uses for a successful payment.
pub const RESPONSE_SUCCESS: &str = "00";

pub struct VnpayClient {
    config: VnpayConfig,
}

impl VnpayClient {
    pub fn new(config: VnpayConfig) -> Self {
        Self { config }
    }

    fn now_vn_timestamp() -> String {
        let offset = FixedOffset::east_opt(VN_OFFSET_SECS).unwrap_or_else(|| {
            // 7h east is always representable; fall back to UTC anyway.
            FixedOffset::east_opt(0).unwrap()
        });
        Utc::now()
            .with_timezone(&offset)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Build the signed redirect URL for a checkout.
    ///
    /// Amount goes out multiplied by 100 (VNPay counts in hundredths
    /// of a dong). `vnp_BankCode` is included only when the caller
    /// preselected a bank, and it participates in the signature like
    /// any other field.
    pub fn build_payment_url(
        &self,
        request: &InitiateRequest,
    ) -> Result<InitiatedPayment, GatewayError> {
        // VNPay prices in hundredths of a dong; refuse amounts the
        // wire field cannot hold rather than signing a wrapped value.
        let wire_amount = request.amount.checked_mul(100).ok_or_else(|| {
            GatewayError::Validation(format!(
                "amount {} is out of range for VNPay",
                request.amount
            ))
        })?;

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), "2.1.0".to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        params.insert(
            "vnp_Locale".to_string(),
            request.locale.clone().unwrap_or_else(|| "vn".to_string()),
        );
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert("vnp_TxnRef".to_string(), request.order_number.clone());
        params.insert("vnp_OrderInfo".to_string(), request.order_info.clone());
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Amount".to_string(), wire_amount.to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.config.return_url.clone());
        params.insert(
            "vnp_IpAddr".to_string(),
            request
                .client_ip
                .clone()
                .unwrap_or_else(|| "127.0.0.1".to_string()),
        );
        params.insert("vnp_CreateDate".to_string(), Self::now_vn_timestamp());
        if let Some(bank) = &request.bank_code {
            if !bank.is_empty() {
                params.insert("vnp_BankCode".to_string(), bank.clone());
            }
        }

        let sign_data = signing::sorted_query(&params);
        let secure_hash = signing::sign_hex(
            HmacAlgorithm::Sha512,
            self.config.hash_secret.expose_secret().as_bytes(),
            sign_data.as_bytes(),
        );

        let pay_url = format!(
            "{}?{}&vnp_SecureHash={}",
            self.config.pay_url, sign_data, secure_hash
        );

        Ok(InitiatedPayment {
            provider: Provider::Vnpay,
            provider_request_id: Some(request.order_number.clone()),
            pay_url: Some(pay_url),
            deeplink: None,
            qr_payload: None,
            raw: serde_json::json!({ "vnp_TxnRef": request.order_number }),
        })
    }

    /// Verify an inbound return/IPN parameter set.
    ///
    /// `vnp_SecureHash` and `vnp_SecureHashType` are removed before the
    /// signature is recomputed over the remaining sorted fields. The
    /// reported amount is converted back from hundredths to whole VND;
    /// a value that is not a clean multiple of 100 fails closed.
    pub fn verify_callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<VerifiedCallback, GatewayError> {
        let supplied = params
            .get("vnp_SecureHash")
            .ok_or(GatewayError::SignatureInvalid { provider: "vnpay" })?;

        let mut signed: BTreeMap<String, String> = params.clone();
        signed.remove("vnp_SecureHash");
        signed.remove("vnp_SecureHashType");

        let sign_data = signing::sorted_query(&signed);
        let valid = signing::verify_hex(
            HmacAlgorithm::Sha512,
            self.config.hash_secret.expose_secret().as_bytes(),
            sign_data.as_bytes(),
            supplied,
        );
        if !valid {
            return Err(GatewayError::SignatureInvalid { provider: "vnpay" });
        }

        let order_number = params
            .get("vnp_TxnRef")
            .cloned()
            .ok_or(GatewayError::Protocol {
                provider: "vnpay",
                detail: "missing vnp_TxnRef".to_string(),
            })?;

        let amount = match params.get("vnp_Amount") {
            Some(raw) => {
                let hundredths: u64 = raw.parse().map_err(|_| GatewayError::Protocol {
                    provider: "vnpay",
                    detail: format!("unparseable vnp_Amount: {raw}"),
                })?;
                if hundredths % 100 != 0 {
                    return Err(GatewayError::Protocol {
                        provider: "vnpay",
                        detail: format!("vnp_Amount not a multiple of 100: {raw}"),
                    });
                }
                Some(hundredths / 100)
            }
            None => None,
        };

        let result_code = params
            .get("vnp_ResponseCode")
            .cloned()
            .unwrap_or_else(|| "99".to_string());

        Ok(VerifiedCallback {
            order_number,
            amount,
            provider_transaction_id: params.get("vnp_TransactionNo").cloned(),
            success: result_code == RESPONSE_SUCCESS,
            result_code,
            message: params.get("vnp_OrderInfo").cloned(),
        })
    }

    /// Build a signed `querydr` parameter set for a status lookup.
    pub fn build_query_request(
        &self,
        order_number: &str,
        transaction_date: &str,
        client_ip: &str,
    ) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), "2.1.0".to_string());
        params.insert("vnp_Command".to_string(), "querydr".to_string());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        params.insert("vnp_TxnRef".to_string(), order_number.to_string());
        params.insert(
            "vnp_OrderInfo".to_string(),
            format!("Query transaction {order_number}"),
        );
        params.insert(
            "vnp_TransactionDate".to_string(),
            transaction_date.to_string(),
        );
        params.insert("vnp_CreateDate".to_string(), Self::now_vn_timestamp());
        params.insert("vnp_IpAddr".to_string(), client_ip.to_string());

        let sign_data = signing::sorted_query(&params);
        let secure_hash = signing::sign_hex(
            HmacAlgorithm::Sha512,
            self.config.hash_secret.expose_secret().as_bytes(),
            sign_data.as_bytes(),
        );
        params.insert("vnp_SecureHash".to_string(), secure_hash);
        params
    }
}
