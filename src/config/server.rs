//! HTTP listener and process-wide runtime settings.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use super::error::ValidationError;

/// Stripe payloads are small; anything past this is refused before parsing.
const MAX_BODY_CEILING: usize = 2 * 1024 * 1024;

/// Deployment stage the process runs in.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Shape of the log lines written to stdout.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Listener, timeouts and log settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Explicit log format. Unset means JSON in production, pretty elsewhere.
    pub log_format: Option<LogFormat>,

    /// Whole-request deadline, seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted request body, bytes.
    pub max_body_bytes: usize,

    /// Comma-separated browser origins allowed to call the meetings API.
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::Development,
            log_level: "info,inrooms_sync=debug,sqlx=warn".to_string(),
            log_format: None,
            request_timeout_secs: 30,
            max_body_bytes: 256 * 1024,
            cors_origins: None,
        }
    }
}

impl ServerConfig {
    /// Address the listener binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        let host = self.host.trim();
        // Bare IPv6 literals need brackets before a port can follow.
        let candidate = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        };
        candidate.parse().map_err(|_| ValidationError::InvalidHost)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured CORS origins, trimmed, blanks dropped.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment, Environment::Development)
    }

    /// The format telemetry should install.
    pub fn effective_log_format(&self) -> LogFormat {
        match (self.log_format, self.environment) {
            (Some(format), _) => format,
            (None, Environment::Production) => LogFormat::Json,
            (None, _) => LogFormat::Pretty,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if !(1..=300).contains(&self.request_timeout_secs) {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_CEILING {
            return Err(ValidationError::InvalidBodyLimit);
        }
        for origin in self.allowed_origins() {
            let parsed = url::Url::parse(&origin).map_err(|_| ValidationError::InvalidCorsOrigin)?;
            if parsed.path() != "/" || parsed.host().is_none() {
                return Err(ValidationError::InvalidCorsOrigin);
            }
        }
        self.socket_addr().map(|_| ())
    }
}
