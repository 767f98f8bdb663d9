/// Verify a BTCPay Server webhook signature (`BTCPay-Sig: sha256=<hex>`).
/// Returns true if the signature is valid, false otherwise.
/// See: <https://docs.btcpayserver.org/API/Greenfield/v1/#tag/Webhooks>
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    if secret.is_empty() {
        return false;
    }

    // Signature format: "sha256=<hex_signature>"
    let Some(hex_sig) = signature_header.trim().strip_prefix("sha256=") else {
        return false;
    };

    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Constant-time equality comparison for secret strings.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
