//! PostgreSQL adapters - The relational source of truth.
//!
//! - `PostgresBillingStore` - Billing rows, user summaries and outbox writes
//! - `PostgresWebhookEventRepository` - Idempotency ledger
//! - `PostgresDeadLetterQueue` - Parked webhook events
//! - `PostgresProjectionOutbox` - Pending user document projections

mod billing_store;
mod dead_letter_queue;
mod projection_outbox;
mod webhook_event_repository;

pub use billing_store::PostgresBillingStore;
pub use dead_letter_queue::PostgresDeadLetterQueue;
pub use projection_outbox::PostgresProjectionOutbox;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Opens the connection pool and, if configured, applies pending migrations.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    let options = config
        .connect_options()
        .map_err(|e| DomainError::new(ErrorCode::ValidationFailed, e.to_string()))?;
    let pool = config
        .pool_options()
        .connect_with(options)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to connect to database: {}", e),
            )
        })?;

    tracing::info!(url = %config.redacted_url(), "Connected to database");

    if config.run_migrations {
        run_migrations(&pool).await?;
    }
    Ok(pool)
}

/// Applies the embedded migrations in `./migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Failed to run migrations: {}", e),
        )
    })?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Wraps a driver error with the operation that failed.
pub(crate) fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}
