//! PostgreSQL pool settings for the billing store and outbox.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use super::error::ValidationError;

/// Upper bound on pool size; the relay and HTTP handlers share one pool.
const POOL_CEILING: u32 = 100;

/// Connection pool for the source-of-truth database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `postgres://` or `postgresql://` URL. Required.
    pub url: String,

    pub min_connections: u32,
    pub max_connections: u32,

    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,

    /// Server-side `statement_timeout`, milliseconds. Zero disables it.
    pub statement_timeout_ms: u64,

    /// Reported as `application_name` in `pg_stat_activity`.
    pub application_name: String,

    /// Apply embedded migrations before serving.
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: 2,
            max_connections: 20,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            statement_timeout_ms: 15_000,
            application_name: "inrooms-sync".to_string(),
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Pool sizing and connection recycling.
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout())
            .idle_timeout(Some(self.idle_timeout()))
            .max_lifetime(Some(self.max_lifetime()))
    }

    /// Per-connection options parsed from the URL plus session settings.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ValidationError> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|_| ValidationError::InvalidDatabaseUrl)?
            .application_name(&self.application_name);

        if self.statement_timeout_ms == 0 {
            return Ok(options);
        }
        Ok(options.options([(
            "statement_timeout",
            format!("{}ms", self.statement_timeout_ms),
        )]))
    }

    /// The URL with any password masked, for log lines.
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                let _ = parsed.set_password(Some("****"));
                parsed.to_string()
            }
            Ok(parsed) => parsed.to_string(),
            Err(_) => "<unparseable>".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE_URL"));
        }
        let scheme_ok = ["postgres://", "postgresql://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme));
        if !scheme_ok {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.max_connections > POOL_CEILING {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        Ok(())
    }
}
