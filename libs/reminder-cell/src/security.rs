use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Compute the SMS provider's request signature: base64 of HMAC-SHA1 over
/// the full request URL followed by each form parameter's key and value,
/// sorted by key.
pub fn twilio_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = url.to_string();
    for (key, value) in sorted {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Inbound SMS webhooks are public; the signature header is the only thing
/// standing between the reply handler and forged requests.
pub fn validate_twilio_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let expected = twilio_signature(auth_token, url, params);

    let Ok(expected_bytes) = STANDARD.decode(&expected) else {
        return false;
    };
    let Ok(given_bytes) = STANDARD.decode(signature) else {
        return false;
    };

    constant_time_eq(&expected_bytes, &given_bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn accepts_a_signature_built_over_sorted_params() {
        let form = params(&[("From", "+15551234567"), ("Body", "CONFIRM")]);
        let url = "https://clinic.example/reminders/sms-reply";
        let signature = twilio_signature("secret-token", url, &form);

        assert!(validate_twilio_signature("secret-token", url, &form, &signature));
    }

    #[test]
    fn rejects_tampered_params_or_wrong_token() {
        let form = params(&[("From", "+15551234567"), ("Body", "CONFIRM")]);
        let url = "https://clinic.example/reminders/sms-reply";
        let signature = twilio_signature("secret-token", url, &form);

        let tampered = params(&[("From", "+15551234567"), ("Body", "CANCEL")]);
        assert!(!validate_twilio_signature("secret-token", url, &tampered, &signature));
        assert!(!validate_twilio_signature("other-token", url, &form, &signature));
        assert!(!validate_twilio_signature("secret-token", url, &form, "not base64!!"));
    }
}
