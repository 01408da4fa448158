//! HMAC-SHA256 authentication for inbound bank notifications.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::WebhookConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookAuthError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    #[error("timestamp header is not a valid timestamp")]
    InvalidTimestamp,
    #[error("timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("signature verification failed")]
    InvalidSignature,
}

/// Lowercase hex HMAC-SHA256 of `message` under `secret`.
pub fn hmac_hex(secret: &[u8], message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks `provided_hex` against the HMAC of `body` in constant time.
///
/// An empty secret never verifies. Length differences are rejected by
/// `ct_eq` without inspecting the contents.
pub fn verify_signature(body: &[u8], provided_hex: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    match hmac_hex(secret.as_bytes(), body) {
        Some(expected) => expected.as_bytes().ct_eq(provided_hex.trim().as_bytes()).into(),
        None => false,
    }
}

/// Accepts RFC 3339 or integer unix seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<i64>() {
        return Utc.timestamp_opt(seconds, 0).single();
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Verifier configured once at startup with the shared secret.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance: Duration::seconds(tolerance_secs),
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(config.secret.clone(), config.tolerance_secs)
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, body: &[u8], provided_hex: &str) -> bool {
        match &self.secret {
            Some(secret) => verify_signature(body, provided_hex, secret),
            None => {
                tracing::error!("PIX webhook secret is not configured; rejecting notification");
                false
            }
        }
    }

    /// Signature a bank would send for `body`. Used by tooling and tests.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        self.secret
            .as_ref()
            .and_then(|secret| hmac_hex(secret.as_bytes(), body))
    }

    pub fn check_timestamp(
        &self,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, WebhookAuthError> {
        let ts = parse_timestamp(raw).ok_or(WebhookAuthError::InvalidTimestamp)?;
        if (now - ts).num_seconds().abs() > self.tolerance.num_seconds() {
            return Err(WebhookAuthError::StaleTimestamp);
        }
        Ok(ts)
    }

    /// Full header check in the order the webhook route applies it: both
    /// headers present, timestamp fresh, then the signature.
    ///
    /// The HMAC covers the body only. The timestamp header is not signed, so
    /// the freshness check does not authenticate the message: a captured
    /// body and signature can be replayed with a new timestamp. Replays are
    /// harmless to settlement because confirming a paid row changes nothing.
    pub fn authenticate(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookAuthError> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookAuthError::MissingHeader("signature"))?;
        let timestamp = timestamp
            .filter(|s| !s.trim().is_empty())
            .ok_or(WebhookAuthError::MissingHeader("timestamp"))?;

        self.check_timestamp(timestamp, now)?;

        if !self.verify(body, signature) {
            return Err(WebhookAuthError::InvalidSignature);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_pix_test";
    const BODY: &[u8] = br#"{"pixTransactionId":"abc","amount":150.0}"#;

    fn signature() -> String {
        hmac_hex(SECRET.as_bytes(), BODY).unwrap()
    }

    #[test]
    fn accepts_exact_signature() {
        assert!(verify_signature(BODY, &signature(), SECRET));
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let sig = signature();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn single_character_mutations_fail() {
        let sig = signature();

        let mut body = BODY.to_vec();
        body[5] ^= 0x01;
        assert!(!verify_signature(&body, &sig, SECRET));

        let mut bad_sig = sig.clone().into_bytes();
        bad_sig[0] = if bad_sig[0] == b'0' { b'1' } else { b'0' };
        assert!(!verify_signature(BODY, std::str::from_utf8(&bad_sig).unwrap(), SECRET));

        assert!(!verify_signature(BODY, &sig, "whsec_pix_tesu"));
    }

    #[test]
    fn empty_secret_fails_closed() {
        let sig = hmac_hex(b"", BODY).unwrap();
        assert!(!verify_signature(BODY, &sig, ""));

        let verifier = WebhookVerifier::new(Some(String::new()), 300);
        assert!(!verifier.is_configured());
        assert!(!verifier.verify(BODY, &sig));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(!verify_signature(BODY, "abcd", SECRET));
        assert!(!verify_signature(BODY, "", SECRET));
    }

    #[test]
    fn parses_both_timestamp_forms() {
        let a = parse_timestamp("1700000000").unwrap();
        let b = parse_timestamp("2023-11-14T22:13:20Z").unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()), 300);
        let now = Utc::now();

        let fresh = now.timestamp().to_string();
        assert!(verifier.check_timestamp(&fresh, now).is_ok());

        let old = (now - Duration::minutes(10)).timestamp().to_string();
        assert_eq!(
            verifier.check_timestamp(&old, now),
            Err(WebhookAuthError::StaleTimestamp)
        );
    }

    #[test]
    fn authenticate_checks_headers_first() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()), 300);
        let now = Utc::now();
        let ts = now.timestamp().to_string();

        assert_eq!(
            verifier.authenticate(BODY, None, Some(&ts), now),
            Err(WebhookAuthError::MissingHeader("signature"))
        );
        assert_eq!(
            verifier.authenticate(BODY, Some("00"), None, now),
            Err(WebhookAuthError::MissingHeader("timestamp"))
        );
        assert_eq!(
            verifier.authenticate(BODY, Some("00"), Some(&ts), now),
            Err(WebhookAuthError::InvalidSignature)
        );
        let sig = verifier.sign(BODY).unwrap();
        assert!(verifier.authenticate(BODY, Some(&sig), Some(&ts), now).is_ok());
    }

    #[test]
    fn timestamp_is_not_part_of_the_signature() {
        let verifier = WebhookVerifier::new(Some(SECRET.to_string()), 300);
        let sig = verifier.sign(BODY).unwrap();
        let first = Utc::now();
        let later = first + Duration::minutes(30);

        assert!(verifier
            .authenticate(BODY, Some(&sig), Some(&first.timestamp().to_string()), first)
            .is_ok());
        // Same body and signature, new timestamp: still accepted.
        assert!(verifier
            .authenticate(BODY, Some(&sig), Some(&later.timestamp().to_string()), later)
            .is_ok());
    }
}
