//! Slack request signing, version `v0`.
//!
//! Slack signs `v0:<timestamp>:<raw body>` with the app's signing secret and sends the hex
//! digest as `X-Slack-Signature: v0=<hex>`. Requests outside the tolerance window are
//! refused so a captured request cannot be replayed later.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

const SIGNATURE_VERSION: &str = "v0";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    MalformedTimestamp(String),
    #[error("request timestamp is {skew_secs}s away from now")]
    StaleTimestamp { skew_secs: i64 },
    #[error("signature is not a v0 hex digest")]
    MalformedSignature,
    #[error("signature does not match request body")]
    Mismatch,
    #[error("signing secret cannot key an hmac")]
    InvalidKey,
}

impl SignatureError {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) => "missing_header",
            Self::MalformedTimestamp(_) => "malformed_timestamp",
            Self::StaleTimestamp { .. } => "stale_timestamp",
            Self::MalformedSignature => "malformed_signature",
            Self::Mismatch => "mismatch",
            Self::InvalidKey => "invalid_key",
        }
    }
}

pub struct SignatureVerifier {
    signing_secret: SecretString,
    tolerance_secs: u64,
}

impl SignatureVerifier {
    pub fn new(signing_secret: SecretString, tolerance_secs: u64) -> Self {
        Self { signing_secret, tolerance_secs }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify_at(timestamp, signature, body, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?.trim();
        let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?.trim();

        let issued_at = timestamp
            .parse::<i64>()
            .map_err(|_| SignatureError::MalformedTimestamp(timestamp.to_owned()))?;
        let skew_secs = now.saturating_sub(issued_at);
        if skew_secs.unsigned_abs() > self.tolerance_secs {
            return Err(SignatureError::StaleTimestamp { skew_secs });
        }

        let provided = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(decode_hex)
            .ok_or(SignatureError::MalformedSignature)?;

        // verify_slice compares in constant time.
        self.mac_for(timestamp, body)?
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Produces the `X-Slack-Signature` value Slack would send for this request.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let digest = self.mac_for(timestamp, body)?.finalize().into_bytes();
        Ok(format!("{SIGNATURE_VERSION}={}", encode_hex(digest.as_slice())))
    }

    fn mac_for(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::InvalidKey)?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    let bytes = value.as_bytes();
    if bytes.is_empty() || bytes.len() % 2 != 0 {
        return None;
    }

    bytes
        .chunks_exact(2)
        .map(|pair| Some((hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?))
        .collect()
}

fn hex_nibble(value: u8) -> Option<u8> {
    match value {
        b'0'..=b'9' => Some(value - b'0'),
        b'a'..=b'f' => Some(value - b'a' + 10),
        b'A'..=b'F' => Some(value - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{SignatureError, SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};

    // Worked example from Slack's request verification guide.
    const SLACK_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const SLACK_TIMESTAMP: &str = "1531420618";
    const SLACK_BODY: &str = "token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
    const SLACK_SIGNATURE: &str =
        "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SecretString::from(SLACK_SECRET), 300)
    }

    fn now() -> i64 {
        SLACK_TIMESTAMP.parse::<i64>().expect("timestamp") + 10
    }

    #[test]
    fn accepts_slack_reference_signature() {
        let result = verifier().verify_at(
            Some(SLACK_TIMESTAMP),
            Some(SLACK_SIGNATURE),
            SLACK_BODY.as_bytes(),
            now(),
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn sign_reproduces_reference_signature() {
        let signed = verifier().sign(SLACK_TIMESTAMP, SLACK_BODY.as_bytes()).expect("sign");
        assert_eq!(signed, SLACK_SIGNATURE);
    }

    #[test]
    fn rejects_tampered_body() {
        let tampered = SLACK_BODY.replace("text=", "text=rm+-rf");
        let result = verifier().verify_at(
            Some(SLACK_TIMESTAMP),
            Some(SLACK_SIGNATURE),
            tampered.as_bytes(),
            now(),
        );
        assert_eq!(result, Err(SignatureError::Mismatch));
    }

    #[test]
    fn rejects_replayed_requests_outside_tolerance() {
        let later = SLACK_TIMESTAMP.parse::<i64>().expect("timestamp") + 301;
        let result = verifier().verify_at(
            Some(SLACK_TIMESTAMP),
            Some(SLACK_SIGNATURE),
            SLACK_BODY.as_bytes(),
            later,
        );
        assert_eq!(result, Err(SignatureError::StaleTimestamp { skew_secs: 301 }));
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        let verifier = verifier();
        let body = SLACK_BODY.as_bytes();

        assert_eq!(
            verifier.verify_at(None, Some(SLACK_SIGNATURE), body, now()),
            Err(SignatureError::MissingHeader(TIMESTAMP_HEADER))
        );
        assert_eq!(
            verifier.verify_at(Some(SLACK_TIMESTAMP), None, body, now()),
            Err(SignatureError::MissingHeader(SIGNATURE_HEADER))
        );
        assert_eq!(
            verifier.verify_at(Some("yesterday"), Some(SLACK_SIGNATURE), body, now()),
            Err(SignatureError::MalformedTimestamp("yesterday".to_owned()))
        );
        for signature in ["a2114d57", "v1=a2114d57", "v0=", "v0=zz", "v0=abc"] {
            assert_eq!(
                verifier.verify_at(Some(SLACK_TIMESTAMP), Some(signature), body, now()),
                Err(SignatureError::MalformedSignature),
                "signature {signature:?}"
            );
        }
    }
}
