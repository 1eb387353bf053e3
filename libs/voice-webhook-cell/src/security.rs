use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, warn};

use shared_config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// Verify the HMAC-SHA256 signature the voice platform sends in
/// X-Vapi-Signature (hex over the raw body).
///
/// No secret in production rejects everything; no secret in development
/// skips verification with a warning. A configured secret with a missing
/// or wrong signature rejects.
pub fn verify_vapi_signature(
    config: &AppConfig,
    raw_body: &[u8],
    signature_header: Option<&str>,
) -> bool {
    let secret = &config.vapi_webhook_secret;

    if secret.is_empty() {
        if config.is_production() {
            error!(
                "vapi_webhook: VAPI_WEBHOOK_SECRET is NOT set in production - \
                 rejecting ALL webhooks. Set the secret to accept voice events."
            );
            return false;
        }
        warn!("vapi_webhook: VAPI_WEBHOOK_SECRET not set - skipping signature check (dev mode)");
        return true;
    }

    let Some(signature) = signature_header else {
        warn!("vapi_webhook: missing X-Vapi-Signature header - rejecting request");
        return false;
    };

    let Ok(expected_bytes) = hex::decode(signature) else {
        warn!("vapi_webhook: malformed signature header - rejecting request");
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(raw_body);

    if mac.verify_slice(&expected_bytes).is_ok() {
        return true;
    }

    warn!("vapi_webhook: HMAC signature mismatch - rejecting request");
    false
}

/// Hex signature for a body; used by tests and outbound verification.
pub fn sign_body(secret: &str, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}
