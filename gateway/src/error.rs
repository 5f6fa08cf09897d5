//! Error types for the payment gateway layer.
//!
//! Every fallible operation in this crate returns a [`GatewayError`].
//! The variants map one-to-one onto the failure classes of the payment
//! flow: configuration problems are fatal at startup, validation
//! problems are the caller's fault, gateway problems are retryable,
//! and signature problems are logged loudly and failed closed.

use thiserror::Error;

use crate::store::TransactionStatus;

/// Errors that can occur anywhere in the payment flow.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A required configuration value is missing or malformed.
    /// Fatal at startup — never deferred to the first request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required request field is missing or invalid. Surfaced as
    /// HTTP 400 before any gateway call is attempted.
    #[error("validation error: {0}")]
    Validation(String),

    /// The provider could not be reached (network failure or timeout).
    /// Retryable by the caller with a fresh provider request id.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// A callback or IPN signature did not verify. The raw payload is
    /// logged by the caller for audit; the error itself stays vague.
    #[error("signature verification failed for {provider}")]
    SignatureInvalid {
        /// Which provider's verification rejected the payload.
        provider: &'static str,
    },

    /// The provider answered, verifiably, with a non-success code.
    /// Terminal for this attempt — not retryable automatically.
    #[error("payment declined by {provider}: code {code}")]
    PaymentDeclined {
        /// The declining provider.
        provider: &'static str,
        /// The provider's own result code, verbatim.
        code: String,
        /// The provider's own message, if any.
        message: Option<String>,
    },

    /// The provider's response could not be parsed. The raw body is
    /// logged by the caller; we fail closed.
    #[error("protocol error from {provider}: {detail}")]
    Protocol {
        /// The misbehaving provider.
        provider: &'static str,
        /// What went wrong while parsing.
        detail: String,
    },

    /// The state machine rejected a transition. Logged; idempotent
    /// duplicate callbacks are reported as a no-op, not this error.
    #[error("illegal transition {from} -> {to} for order {order_number}")]
    IllegalTransition {
        /// The order whose transition was rejected.
        order_number: String,
        /// Status the order currently holds.
        from: TransactionStatus,
        /// Status the caller tried to move to.
        to: TransactionStatus,
    },

    /// A callback reported an amount different from the stored order.
    /// Hard verification failure even when the signature is valid.
    #[error("amount mismatch for order {order_number}: callback reports {reported}, order holds {stored}")]
    AmountMismatch {
        order_number: String,
        reported: u64,
        stored: u64,
    },

    /// No transaction exists for the given id or order number.
    #[error("transaction not found: {0}")]
    NotFound(String),

    /// Snapshot file I/O failed.
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// `true` if the caller may retry the operation (with a fresh
    /// provider request id, per the retry contract).
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::GatewayUnavailable(_))
    }
}
