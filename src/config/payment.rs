//! Stripe credentials and webhook acceptance rules.

use serde::Deserialize;

use super::error::ValidationError;

/// Which Stripe environment an API key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripeKeyMode {
    Test,
    Live,
}

/// Stripe section. Secrets stay plain strings here and are wrapped by the
/// adapters that use them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Secret (`sk_`) or restricted (`rk_`) key; only read calls are made.
    pub stripe_api_key: String,

    /// Endpoint signing secret, `whsec_...`.
    pub stripe_webhook_secret: String,

    /// Oldest acceptable signature timestamp, seconds.
    pub webhook_tolerance_secs: i64,

    /// Refuse events carrying `livemode: false`.
    pub require_livemode: bool,

    /// REST base, pointed at stripe-mock in tests.
    pub stripe_api_base: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: String::new(),
            stripe_webhook_secret: String::new(),
            webhook_tolerance_secs: 300,
            require_livemode: false,
            stripe_api_base: "https://api.stripe.com/v1".to_string(),
        }
    }
}

impl PaymentConfig {
    /// Mode encoded in the key prefix, if the key is recognisable.
    pub fn key_mode(&self) -> Option<StripeKeyMode> {
        let key = self.stripe_api_key.as_str();
        ["sk_", "rk_"].iter().find_map(|kind| {
            let rest = key.strip_prefix(kind)?;
            if rest.starts_with("live_") {
                Some(StripeKeyMode::Live)
            } else if rest.starts_with("test_") {
                Some(StripeKeyMode::Test)
            } else {
                None
            }
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }
        let mode = self.key_mode().ok_or(ValidationError::InvalidStripeKey)?;
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if !(1..=3600).contains(&self.webhook_tolerance_secs) {
            return Err(ValidationError::InvalidWebhookTolerance);
        }
        // Live events would be looked up against the test account otherwise.
        if self.require_livemode && mode == StripeKeyMode::Test {
            return Err(ValidationError::LivemodeWithTestKey);
        }
        Ok(())
    }
}
