//! Webhook signature verification, offered as a standalone utility for
//! deployments that front the control endpoints with a provider-signature
//! check. Not wired into `control.rs` itself — the core trusts whatever
//! reaches `/twiml` and `/status`, and an operator who needs the stronger
//! guarantee composes this in front of it (e.g. as a tower layer).

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Max clock skew tolerated between a signed timestamp and now.
const REPLAY_WINDOW_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature does not match the computed value")]
    Mismatch,
    #[error("signature was not valid base64")]
    InvalidEncoding,
    #[error("public key or signature had the wrong length")]
    InvalidKeyMaterial,
    #[error("timestamp is outside the allowed replay window")]
    ReplayWindowExceeded,
}

/// Verify a Twilio-style request signature: HMAC-SHA1 over the full request
/// URL concatenated with sorted POST-parameter key/value pairs, base64
/// encoded, compared to the `X-Twilio-Signature` header value.
///
/// `params` must already be sorted by key — callers own ordering, this
/// function does not sort for them.
pub fn verify_twilio_signature(
    auth_token: &str,
    url: &str,
    params: &[(&str, &str)],
    signature_header: &str,
) -> Result<(), SignatureError> {
    let mut data = url.to_string();
    for (k, v) in params {
        data.push_str(k);
        data.push_str(v);
    }

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .map_err(|_| SignatureError::InvalidKeyMaterial)?;
    mac.update(data.as_bytes());
    let computed = mac.finalize().into_bytes();
    let computed_b64 = base64::engine::general_purpose::STANDARD.encode(computed);

    if constant_time_eq(computed_b64.as_bytes(), signature_header.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verify an Ed25519-signed webhook body plus a bounded-age timestamp, for
/// providers that sign with a public key rather than a shared secret.
pub fn verify_replay(
    public_key: &[u8],
    signature: &[u8],
    body: &[u8],
    timestamp: i64,
    now: i64,
) -> Result<(), SignatureError> {
    if (now - timestamp).abs() > REPLAY_WINDOW_SECS {
        return Err(SignatureError::ReplayWindowExceeded);
    }

    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| SignatureError::InvalidKeyMaterial)?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| SignatureError::InvalidKeyMaterial)?;

    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| SignatureError::InvalidKeyMaterial)?;
    let sig = Signature::from_bytes(&sig_bytes);

    let mut signed = format!("{timestamp}|").into_bytes();
    signed.extend_from_slice(body);

    verifying_key
        .verify(&signed, &sig)
        .map_err(|_| SignatureError::Mismatch)
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
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn twilio_signature_round_trips() {
        let token = "auth-token-123";
        let url = "https://bridge.example.com/status";
        let params = [("CallSid", "CA123"), ("CallStatus", "completed")];

        let mut data = url.to_string();
        for (k, v) in &params {
            data.push_str(k);
            data.push_str(v);
        }
        let mut mac = HmacSha1::new_from_slice(token.as_bytes()).unwrap();
        mac.update(data.as_bytes());
        let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        assert!(verify_twilio_signature(token, url, &params, &expected).is_ok());
    }

    #[test]
    fn twilio_signature_rejects_tampered_params() {
        let token = "auth-token-123";
        let url = "https://bridge.example.com/status";
        let signed_params = [("CallSid", "CA123")];
        let tampered_params = [("CallSid", "CA999")];

        let mut data = url.to_string();
        for (k, v) in &signed_params {
            data.push_str(k);
            data.push_str(v);
        }
        let mut mac = HmacSha1::new_from_slice(token.as_bytes()).unwrap();
        mac.update(data.as_bytes());
        let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let result = verify_twilio_signature(token, url, &tampered_params, &signature);
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn ed25519_replay_round_trips() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let body = b"call completed";
        let timestamp = 1_700_000_000i64;

        let mut signed = format!("{timestamp}|").into_bytes();
        signed.extend_from_slice(body);
        let signature = signing_key.sign(&signed);

        let result = verify_replay(
            signing_key.verifying_key().as_bytes(),
            &signature.to_bytes(),
            body,
            timestamp,
            timestamp + 10,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn ed25519_replay_rejects_stale_timestamp() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let body = b"call completed";
        let timestamp = 1_700_000_000i64;

        let mut signed = format!("{timestamp}|").into_bytes();
        signed.extend_from_slice(body);
        let signature = signing_key.sign(&signed);

        let result = verify_replay(
            signing_key.verifying_key().as_bytes(),
            &signature.to_bytes(),
            body,
            timestamp,
            timestamp + REPLAY_WINDOW_SECS + 1,
        );
        assert_eq!(result, Err(SignatureError::ReplayWindowExceeded));
    }
}
