//! Typed settings for the synchronizer.
//!
//! Values come from an optional file named by `INROOMS_CONFIG_FILE`, then
//! from `INROOMS__SECTION__KEY` environment variables, which win. A `.env`
//! file is read first when present.

mod admin;
mod database;
mod error;
mod firestore;
mod meeting;
mod payment;
mod server;
mod sync;

use std::path::Path;

use serde::Deserialize;

pub use admin::AdminConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use firestore::FirestoreConfig;
pub use meeting::MeetingConfig;
pub use payment::{PaymentConfig, StripeKeyMode};
pub use server::{Environment, LogFormat, ServerConfig};
pub use sync::SyncConfig;

/// Environment variable naming an extra settings file (TOML, YAML or JSON).
pub const CONFIG_FILE_VAR: &str = "INROOMS_CONFIG_FILE";

/// Every section of the process configuration.
///
/// `database`, `payment` and `firestore` have no usable defaults and must be
/// supplied.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
    pub firestore: FirestoreConfig,
    #[serde(default)]
    pub meeting: MeetingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Reads `.env`, the optional settings file, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = std::env::var_os(CONFIG_FILE_VAR);
        Self::load_from(file.as_deref().map(Path::new))
    }

    /// Like [`AppConfig::load`] with an explicit file and without `.env`.
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("INROOMS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Checks every section; the first failure wins.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.firestore.validate()?;
        self.meeting.validate()?;
        self.sync.validate()?;
        self.admin.validate()?;
        if self.is_production() && !self.payment.require_livemode {
            tracing::warn!("Production is accepting test-mode Stripe events");
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
