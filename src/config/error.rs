//! Failures while reading or checking settings.

use thiserror::Error;

/// Settings could not be read or did not deserialize.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not load settings: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// A value deserialized but is out of range or malformed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingRequired(&'static str),

    #[error("port must be non-zero")]
    InvalidPort,

    #[error("request timeout must be 1..=300 seconds")]
    InvalidTimeout,

    #[error("Request body limit must be between 1 byte and 2 MiB")]
    InvalidBodyLimit,

    #[error("CORS origins must look like scheme://host[:port]")]
    InvalidCorsOrigin,

    #[error("host is not an IP address")]
    InvalidHost,

    #[error("database url must use the postgres:// or postgresql:// scheme")]
    InvalidDatabaseUrl,

    #[error("pool needs 0 < min_connections <= max_connections")]
    InvalidPoolSize,

    #[error("max_connections is capped at 100")]
    PoolSizeTooLarge,

    #[error("Stripe API key must start with sk_ or rk_")]
    InvalidStripeKey,

    #[error("Stripe webhook secret must start with whsec_")]
    InvalidStripeWebhookSecret,

    #[error("require_livemode is set but the Stripe key is a test key")]
    LivemodeWithTestKey,

    #[error("Webhook tolerance must be between 1 and 3600 seconds")]
    InvalidWebhookTolerance,

    #[error("Invalid Firestore project id")]
    InvalidFirestoreProject,

    #[error("Service account credentials are neither JSON nor base64 JSON")]
    InvalidServiceAccount,

    #[error("Invalid calendar id")]
    InvalidCalendarId,

    #[error("Sync settings out of range: {0}")]
    InvalidSyncSetting(&'static str),

    #[error("Admin token must be at least 32 characters")]
    AdminTokenTooShort,
}
