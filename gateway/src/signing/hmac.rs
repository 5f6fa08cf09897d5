//! # HMAC Signing
//!
//! Hex-encoded HMAC digests over canonical parameter strings — the
//! signature primitive shared by every HMAC-based provider. VNPay
//! signs with HMAC-SHA512; Momo, ZaloPay, and Viettel Money sign with
//! HMAC-SHA256.
//!
//! Verification always recomputes the digest independently and
//! compares in constant time. There is deliberately no code path that
//! trusts a caller-supplied "expected" value: an incorrectly built
//! canonical string must fail verification, never bypass it.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Which HMAC flavor a provider mandates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlgorithm {
    /// HMAC-SHA256 — Momo, ZaloPay, Viettel Money.
    Sha256,
    /// HMAC-SHA512 — VNPay.
    Sha512,
}

/// Compute the lowercase hex HMAC digest of `payload` under `key`.
///
/// Pure and deterministic: the same payload and key always produce the
/// same digest. Changing any single byte of the payload changes the
/// digest.
pub fn sign_hex(algorithm: HmacAlgorithm, key: &[u8], payload: &[u8]) -> String {
    match algorithm {
        HmacAlgorithm::Sha256 => {
            let mut mac =
                HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        HmacAlgorithm::Sha512 => {
            let mut mac =
                HmacSha512::new_from_slice(key).expect("HMAC can take key of any size");
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

/// Verify a supplied hex digest against an independently recomputed one.
///
/// Case-insensitive on the supplied digest (gateways differ on hex
/// casing), constant-time on the comparison. Returns `false` for any
/// malformed digest rather than erroring — a garbage signature is just
/// an invalid signature.
pub fn verify_hex(algorithm: HmacAlgorithm, key: &[u8], payload: &[u8], supplied: &str) -> bool {
    let expected = sign_hex(algorithm, key, payload);
    let supplied = supplied.to_ascii_lowercase();

    // Length differs: definitely invalid, and ct_eq would panic-free
    // short-circuit anyway since it requires equal lengths.
    if expected.len() != supplied.len() {
        return false;
    }

    expected.as_bytes().ct_eq(supplied.as_bytes()).unwrap_u8() == 1
}
