//! Transaction record types.
//!
//! [`PaymentOrder`] serializes with the exact camelCase field names of
//! the original `transactions.json` contract, so an existing snapshot
//! file loads unchanged. New fields (`providerTransactionId`, `audit`)
//! are defaulted on deserialize for the same reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment provider a transaction was routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    BankTransfer,
    Vnpay,
    Momo,
    Zalopay,
    ViettelMoney,
    Paypal,
    Cod,
}

impl Provider {
    /// Stable wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::BankTransfer => "bank_transfer",
            Provider::Vnpay => "vnpay",
            Provider::Momo => "momo",
            Provider::Zalopay => "zalopay",
            Provider::ViettelMoney => "viettel_money",
            Provider::Paypal => "paypal",
            Provider::Cod => "cod",
        }
    }

    /// Whether an asynchronous gateway confirmation is expected for
    /// this provider. Bank transfers are confirmed by an admin off
    /// the statement and COD on delivery — neither has a callback to
    /// wait for, so the stale sweeper must leave them alone.
    pub fn expects_gateway_callback(&self) -> bool {
        !matches!(self, Provider::BankTransfer | Provider::Cod)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a payment order. Transitions are governed by
/// the state machine in [`crate::store::state`] — never assign this
/// field directly outside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting funds confirmation (e.g. bank transfer QR shown).
    Pending,
    /// Payment initiated at a gateway, awaiting async confirmation.
    Processing,
    /// Verified success. Terminal except for admin refund.
    Completed,
    /// Verified decline, invalid signature, or timeout. Terminal.
    Failed,
    /// Administrator-issued refund of a completed order. Terminal.
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// Terminal states never leave except `completed -> refunded`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Refunded
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who requested a transition. The state machine gates some edges on
/// this: refunds are admin-only, timeouts are system-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Checkout flow acting on the customer's behalf.
    Customer,
    /// A verified gateway callback or IPN.
    Gateway,
    /// An administrator via the transactions API.
    Admin,
    /// Internal machinery (stale-order sweeper).
    System,
}

/// One applied transition, recorded for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
    /// Free-form context: result code, decline reason, sweep note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A single payment order, aka transaction.
///
/// `order_number` is the merchant's stable human-facing reference,
/// generated exactly once per checkout attempt and reused across
/// retries — it is what gateways see as `orderId`/`vnp_TxnRef`.
/// `id` is the opaque store key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    /// Opaque unique identifier, immutable after creation.
    pub id: String,
    /// Human-facing order reference (`HD…`), unique, stable per
    /// checkout attempt.
    #[serde(rename = "orderId")]
    pub order_number: String,
    /// Amount in the smallest currency unit. VND has no subunit.
    pub amount: u64,
    pub currency: String,
    #[serde(rename = "paymentMethod")]
    pub provider: Provider,
    pub status: TransactionStatus,
    /// External reference returned by the gateway once confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Cart items, passed through opaquely.
    #[serde(default)]
    pub items: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Bumped on every applied transition.
    pub updated_at: DateTime<Utc>,
    /// Applied transitions, oldest first.
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

/// What a caller supplies to create a new order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(rename = "orderId")]
    pub order_number: String,
    pub amount: u64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(rename = "paymentMethod")]
    pub provider: Provider,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub items: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl PaymentOrder {
    /// Materialize a new order in `pending` with a fresh opaque id.
    pub fn create(new: NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id: format!("TXN_{}", Uuid::new_v4().simple()),
            order_number: new.order_number,
            amount: new.amount,
            currency: new
                .currency
                .unwrap_or_else(|| crate::config::DEFAULT_CURRENCY.to_string()),
            provider: new.provider,
            status: TransactionStatus::Pending,
            provider_transaction_id: None,
            customer_name: new.customer_name,
            customer_email: new.customer_email,
            items: new.items.unwrap_or_else(|| serde_json::json!([])),
            metadata: new.metadata.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
            audit: Vec::new(),
        }
    }
}
