//! Bank transfer and cash-on-delivery. No gateway, no signature;
//! the order is confirmed later by an operator (bank transfer after
//! checking the statement, COD on delivery).

use serde::Serialize;

use crate::config::BankTransferConfig;
use crate::providers::{InitiateRequest, InitiatedPayment};
use crate::store::Provider;

/// Manual transfer instructions shown to the customer. The order
/// number doubles as the transfer memo so the operator can match the
/// incoming payment to an order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInstructions {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub amount: u64,
    pub transfer_memo: String,
}

/// Checkout artifact for a manual bank transfer.
///
/// The QR payload is the pipe-joined instruction set a banking app
/// can prefill from: `bank|account|holder|amount|memo`.
pub fn bank_transfer(config: &BankTransferConfig, request: &InitiateRequest) -> InitiatedPayment {
    let instructions = TransferInstructions {
        bank_name: config.bank_name.clone(),
        account_number: config.account_number.clone(),
        account_name: config.account_name.clone(),
        amount: request.amount,
        transfer_memo: request.order_number.clone(),
    };

    let qr_payload = format!(
        "{}|{}|{}|{}|{}",
        instructions.bank_name,
        instructions.account_number,
        instructions.account_name,
        instructions.amount,
        instructions.transfer_memo,
    );

    InitiatedPayment {
        provider: Provider::BankTransfer,
        provider_request_id: None,
        pay_url: None,
        deeplink: None,
        qr_payload: Some(qr_payload),
        raw: serde_json::json!({ "instructions": instructions }),
    }
}

/// Checkout artifact for cash on delivery: nothing to pay now.
pub fn cod(request: &InitiateRequest) -> InitiatedPayment {
    InitiatedPayment {
        provider: Provider::Cod,
        provider_request_id: None,
        pay_url: None,
        deeplink: None,
        qr_payload: None,
        raw: serde_json::json!({
            "orderId": request.order_number,
            "amountDue": request.amount,
        }),
    }
}
