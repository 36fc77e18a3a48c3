// src/api/signing.rs

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// HMAC-SHA256 in hex. Used to sign/verify gateway webhook bodies.
pub fn sign_hmac_sha256_hex(secret: &str, data: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data);
    let result = mac.finalize().into_bytes();
    hex::encode(result)
}

/// A webhook call is accepted when either the `apikey` header matches the
/// shared secret or `X-Webhook-Signature` carries the body's HMAC.
pub fn verify_webhook(
    secret: &str,
    body: &[u8],
    api_key_header: Option<&str>,
    signature_header: Option<&str>,
) -> bool {
    if let Some(key) = api_key_header {
        if key == secret {
            return true;
        }
    }
    if let Some(signature) = signature_header {
        return signature.eq_ignore_ascii_case(&sign_hmac_sha256_hex(secret, body));
    }
    false
}
