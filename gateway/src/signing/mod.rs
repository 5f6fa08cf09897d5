//! # Signature Engine
//!
//! Deterministic digest construction over provider-specific canonical
//! parameter strings. This is the part of the system with a real
//! correctness contract: an incorrectly built signature string
//! silently causes 100% payment failures — or worse, accepts forged
//! callbacks. No library hides this; each provider defines its own
//! field set, field order, and encoding rules, and we reproduce them
//! byte for byte.

pub mod canonical;
pub mod hmac;

pub use canonical::{fixed_order_query, pipe_joined, sorted_query, vnpay_encode};
pub use hmac::{sign_hex, verify_hex, HmacAlgorithm};
