//! Inbound webhook signature verification. The HTTP surface that receives
//! signals lives outside this crate; this module is the one piece of that
//! contract the Brain itself owns — checking that a claimed payload was
//! actually signed with the shared secret before it reaches `SignalProcessor`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a hex-encoded HMAC-SHA256 signature over `body` using `secret`.
/// Returns `false` on any malformed hex rather than propagating an error —
/// a bad signature and a bad encoding are the same outcome to the caller.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected_bytes) = hex::decode(signature_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&expected_bytes).is_ok()
}

/// Computes the hex-encoded HMAC-SHA256 signature for `body`, used by tests
/// and by any internal caller that needs to re-sign a replayed payload.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
