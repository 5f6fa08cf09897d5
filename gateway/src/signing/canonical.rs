//! # Canonical String Construction
//!
//! Every provider signs a different concatenation of its fields, and
//! every byte matters: a reordered key, a differently encoded space,
//! or a silently defaulted missing field produces a digest that will
//! never match. This module owns the three disciplines in use:
//!
//! - **Sorted query** (VNPay) — fields sorted alphabetically by key,
//!   each key and value passed through the VNPay encoding variant,
//!   joined as `k=v&k=v`. The *same* encoder must be used for the
//!   signed string and the outbound URL, or the signed set diverges
//!   from the sent set.
//! - **Fixed order** (Momo, Viettel Money) — `k=v&k=v` in an exact
//!   per-endpoint order, values verbatim. Create, callback, and query
//!   each mandate a different order; they are not interchangeable.
//! - **Pipe-delimited** (ZaloPay) — raw values joined with `|` in a
//!   fixed list, no keys at all.
//!
//! Missing required fields fail closed: the builders return an error
//! instead of substituting an empty default.

use std::collections::BTreeMap;

use crate::error::GatewayError;

/// Percent-encode a string the way VNPay's reference implementation
/// does: unreserved characters (`A-Z a-z 0-9 - _ . ~`) pass through,
/// spaces become `+`, everything else is `%XX`-escaped (UTF-8 bytes).
///
/// Used for both the signature payload and the payment URL so the two
/// stay byte-identical.
pub fn vnpay_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => {
                out.push('%');
                out.push_str(&format!("{:02X}", other));
            }
        }
    }
    out
}

/// Build the sorted, encoded `k=v&k=v` string VNPay signs and sends.
///
/// Fields are sorted alphabetically by key. Both keys and values go
/// through [`vnpay_encode`]. Empty-valued fields are skipped entirely,
/// matching the gateway's treatment of absent optional parameters.
pub fn sorted_query(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", vnpay_encode(k), vnpay_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Join `(key, value)` pairs as `k=v&k=v` in the exact order given.
///
/// The value lookup fails closed: if `fields` lacks any key in
/// `order`, the whole construction is rejected. Optional fields that
/// are legitimately empty must be present in `fields` with an empty
/// value — absence and emptiness are different things here.
pub fn fixed_order_query(
    fields: &BTreeMap<String, String>,
    order: &[&str],
) -> Result<String, GatewayError> {
    let mut parts = Vec::with_capacity(order.len());
    for key in order {
        let value = fields.get(*key).ok_or_else(|| {
            GatewayError::Validation(format!("missing required signature field: {}", key))
        })?;
        parts.push(format!("{}={}", key, value));
    }
    Ok(parts.join("&"))
}

/// Join raw values with `|` in the exact order given, failing closed
/// on any missing field.
pub fn pipe_joined(
    fields: &BTreeMap<String, String>,
    order: &[&str],
) -> Result<String, GatewayError> {
    let mut parts = Vec::with_capacity(order.len());
    for key in order {
        let value = fields.get(*key).ok_or_else(|| {
            GatewayError::Validation(format!("missing required signature field: {}", key))
        })?;
        parts.push(value.as_str());
    }
    Ok(parts.join("|"))
}
