//! Standard Webhooks verification as used by Dodo Payments.
//!
//! The signed content is `{webhook-id}.{webhook-timestamp}.{raw body}`, MACed
//! with HMAC-SHA256 under the base64 key that follows the `whsec_` prefix.
//! `webhook-signature` carries one or more space separated `v1,<base64>`
//! entries; any match is accepted.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing webhook header: {0}")]
    MissingHeader(&'static str),
    #[error("invalid webhook timestamp")]
    InvalidTimestamp,
    #[error("webhook timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("no matching signature")]
    NoMatchingSignature,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("webhook secret is not valid base64")]
pub struct InvalidSecret;

/// The three Standard Webhooks headers, copied out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub id: String,
    pub timestamp: String,
    pub signature: String,
}

#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance_seconds: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: &str, tolerance_seconds: i64) -> Result<Self, InvalidSecret> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);
        let key = STANDARD.decode(encoded).map_err(|_| InvalidSecret)?;
        if key.is_empty() {
            return Err(InvalidSecret);
        }
        Ok(Self {
            key,
            tolerance_seconds: tolerance_seconds.max(0),
        })
    }

    pub fn verify(&self, headers: &WebhookHeaders, payload: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(headers, payload, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(
        &self,
        headers: &WebhookHeaders,
        payload: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        if headers.id.is_empty() {
            return Err(SignatureError::MissingHeader("webhook-id"));
        }
        if headers.timestamp.is_empty() {
            return Err(SignatureError::MissingHeader("webhook-timestamp"));
        }
        if headers.signature.is_empty() {
            return Err(SignatureError::MissingHeader("webhook-signature"));
        }

        let ts = headers
            .timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        if now.abs_diff(ts) > self.tolerance_seconds.unsigned_abs() {
            return Err(SignatureError::TimestampOutOfTolerance);
        }

        let expected = self.compute(&headers.id, headers.timestamp.trim(), payload);
        let matched = headers
            .signature
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .any(|(_, sig)| expected.as_bytes().ct_eq(sig.as_bytes()).into());

        if matched {
            Ok(())
        } else {
            Err(SignatureError::NoMatchingSignature)
        }
    }

    /// Produces a `v1,<base64>` header value for the given message.
    pub fn sign(&self, msg_id: &str, timestamp: i64, payload: &[u8]) -> String {
        format!(
            "{SIGNATURE_VERSION},{}",
            self.compute(msg_id, &timestamp.to_string(), payload)
        )
    }

    fn compute(&self, msg_id: &str, timestamp: &str, payload: &[u8]) -> String {
        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC can take key of any size"));
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        STANDARD.encode(mac.finalize().into_bytes())
    }
}
