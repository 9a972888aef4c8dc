//! Stripe-Signature verification.
//!
//! Stripe signs `"{t}.{raw body}"` with HMAC-SHA256 under the endpoint secret
//! and sends `t=<unix>,v1=<hex>[,v1=<hex>...]`. Several `v1` entries appear
//! while a secret is being rolled; any one matching is enough.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::stripe_event::StripeEvent;
use super::webhook_errors::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Oldest signature accepted by default, seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// How far ahead of our clock a signature timestamp may be.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Decoded `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
    /// Legacy scheme; parsed but never trusted.
    pub v0_signature: Option<Vec<u8>>,
}

fn malformed(what: &str) -> WebhookError {
    WebhookError::ParseError(format!("Stripe-Signature: {}", what))
}

impl SignatureHeader {
    /// Parses `t=...,v1=...` pairs. Unknown keys are skipped.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut parsed = SignatureHeader {
            timestamp: 0,
            v1_signatures: Vec::new(),
            v0_signature: None,
        };
        let mut saw_timestamp = false;

        for pair in header.split(',').map(str::trim) {
            let (key, value) = pair.split_once('=').ok_or_else(|| malformed("expected key=value"))?;
            match key {
                "t" => {
                    parsed.timestamp = value.parse().map_err(|_| malformed("bad timestamp"))?;
                    saw_timestamp = true;
                }
                "v1" => parsed
                    .v1_signatures
                    .push(hex::decode(value).map_err(|_| malformed("v1 is not hex"))?),
                "v0" => {
                    parsed.v0_signature =
                        Some(hex::decode(value).map_err(|_| malformed("v0 is not hex"))?)
                }
                _ => {}
            }
        }

        if !saw_timestamp {
            return Err(malformed("missing t"));
        }
        if parsed.v1_signatures.is_empty() {
            return Err(malformed("missing v1"));
        }
        Ok(parsed)
    }
}

/// Authenticates webhook bodies and decodes the event envelope.
pub struct StripeWebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
    require_livemode: bool,
}

impl StripeWebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            require_livemode: false,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Refuse `livemode: false` events once the signature checks out.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    /// Checks the signature against the raw body, then decodes it.
    ///
    /// Nothing is decoded until the signature matches, so a forged body can
    /// only ever produce a signature or timestamp error.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, WebhookError> {
        self.verify_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<StripeEvent, WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;
        self.check_freshness(header.timestamp, now)?;

        let mac = self.signer(header.timestamp, payload)?;
        // verify_slice compares in constant time.
        let authentic = header
            .v1_signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
        if !authentic {
            return Err(WebhookError::InvalidSignature);
        }

        let event: StripeEvent =
            serde_json::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))?;
        if self.require_livemode && !event.livemode {
            return Err(WebhookError::TestModeRejected);
        }
        Ok(event)
    }

    fn check_freshness(&self, timestamp: i64, now: i64) -> Result<(), WebhookError> {
        let age = now.saturating_sub(timestamp);
        if age > self.tolerance_secs {
            Err(WebhookError::TimestampOutOfRange)
        } else if age < -MAX_CLOCK_SKEW_SECS {
            Err(WebhookError::InvalidTimestamp)
        } else {
            Ok(())
        }
    }

    /// MAC primed with `"{timestamp}.{payload}"`.
    fn signer(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

/// `Stripe-Signature` value for a fixture body.
#[cfg(test)]
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
