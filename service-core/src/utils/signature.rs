use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical `Key=Value` list used for provider request signing.
///
/// Fields keep the given order. A field whose value is `None` or empty is
/// left out entirely, never rendered as `Key=`.
pub fn canonical_field_string(fields: &[(&str, Option<&str>)]) -> String {
    fields
        .iter()
        .filter_map(|(key, value)| match value {
            Some(v) if !v.is_empty() => Some(format!("{}={}", key, v)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Base64 encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn sign_base64(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a base64 HMAC-SHA256 signature using constant-time comparison.
pub fn verify_base64(secret: &str, payload: &str, signature: &str) -> Result<bool, anyhow::Error> {
    let expected_signature = sign_base64(secret, payload)?;

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = signature.trim().as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_omits_missing_and_empty_fields() {
        let canonical = canonical_field_string(&[
            ("Amount", Some("10.00")),
            ("Street", Some("")),
            ("City", None),
            ("TransactionId", Some("ORD-1")),
        ]);
        assert_eq!(canonical, "Amount=10.00,TransactionId=ORD-1");
    }

    #[test]
    fn signature_is_deterministic() {
        let first = sign_base64("secret", "Amount=10.00,TransactionId=ORD-1").unwrap();
        let second = sign_base64("secret", "Amount=10.00,TransactionId=ORD-1").unwrap();
        assert_eq!(first, second);
        assert!(general_purpose::STANDARD.decode(&first).is_ok());
    }

    #[test]
    fn known_vector_matches() {
        // RFC 4231 test case 2
        let signature = sign_base64("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(signature, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn verify_accepts_valid_and_rejects_tampered() {
        let signature = sign_base64("secret", "PaymentId=abc,StatusId=2").unwrap();
        assert!(verify_base64("secret", "PaymentId=abc,StatusId=2", &signature).unwrap());
        assert!(!verify_base64("secret", "PaymentId=abc,StatusId=3", &signature).unwrap());
        assert!(!verify_base64("other", "PaymentId=abc,StatusId=2", &signature).unwrap());
        assert!(!verify_base64("secret", "PaymentId=abc,StatusId=2", "short").unwrap());
    }
}
