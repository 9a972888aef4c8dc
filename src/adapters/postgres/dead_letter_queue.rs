//! PostgreSQL implementation of DeadLetterQueue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::db_error;
use crate::domain::foundation::{DeadLetterId, DomainError};
use crate::ports::{DeadLetter, DeadLetterQueue};

/// PostgreSQL implementation of the DeadLetterQueue port.
pub struct PostgresDeadLetterQueue {
    pool: PgPool,
}

impl PostgresDeadLetterQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeadLetterRow {
    id: Uuid,
    event_id: String,
    event_type: String,
    reason: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolution: Option<String>,
}

impl From<DeadLetterRow> for DeadLetter {
    fn from(row: DeadLetterRow) -> Self {
        DeadLetter {
            id: DeadLetterId::from_uuid(row.id),
            event_id: row.event_id,
            event_type: row.event_type,
            reason: row.reason,
            payload: row.payload,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            resolution: row.resolution,
        }
    }
}

#[async_trait]
impl DeadLetterQueue for PostgresDeadLetterQueue {
    async fn push(&self, letter: DeadLetter) -> Result<DeadLetterId, DomainError> {
        // The partial unique index keeps one open letter per event id
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO stripe_webhook_dead_letters (id, event_id, event_type, reason, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) WHERE resolved_at IS NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(letter.id.as_uuid())
        .bind(&letter.event_id)
        .bind(&letter.event_type)
        .bind(&letter.reason)
        .bind(&letter.payload)
        .bind(letter.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert dead letter", e))?;

        if let Some(id) = inserted {
            return Ok(DeadLetterId::from_uuid(id));
        }

        let open: Uuid = sqlx::query_scalar(
            "SELECT id FROM stripe_webhook_dead_letters WHERE event_id = $1 AND resolved_at IS NULL",
        )
        .bind(&letter.event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read open dead letter", e))?;
        Ok(DeadLetterId::from_uuid(open))
    }

    async fn list_open(&self, limit: i64) -> Result<Vec<DeadLetter>, DomainError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, reason, payload, created_at, resolved_at, resolution
            FROM stripe_webhook_dead_letters
            WHERE resolved_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list dead letters", e))?;

        Ok(rows.into_iter().map(DeadLetter::from).collect())
    }

    async fn get(&self, id: DeadLetterId) -> Result<Option<DeadLetter>, DomainError> {
        let row: Option<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, reason, payload, created_at, resolved_at, resolution
            FROM stripe_webhook_dead_letters
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch dead letter", e))?;

        Ok(row.map(DeadLetter::from))
    }

    async fn resolve(&self, id: DeadLetterId, resolution: &str) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE stripe_webhook_dead_letters
            SET resolved_at = NOW(), resolution = $2
            WHERE id = $1 AND resolved_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(resolution)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to resolve dead letter", e))?;

        Ok(result.rows_affected() > 0)
    }
}
