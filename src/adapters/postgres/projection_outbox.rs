//! PostgreSQL implementation of ProjectionOutbox.
//!
//! Entries are inserted by `PostgresBillingStore::commit` inside the billing
//! transaction through [`insert_projection`]; this adapter reads and settles
//! them. Failed entries are deferred through `next_attempt_at`, never dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::db_error;
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{ProjectionEntry, ProjectionOutbox, ProjectionStatus};

/// PostgreSQL implementation of the ProjectionOutbox port.
pub struct PostgresProjectionOutbox {
    pool: PgPool,
}

impl PostgresProjectionOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectionRow {
    id: Uuid,
    user_id: String,
    source: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    next_attempt_at: DateTime<Utc>,
}

impl TryFrom<ProjectionRow> for ProjectionEntry {
    type Error = DomainError;

    fn try_from(row: ProjectionRow) -> Result<Self, Self::Error> {
        let status = ProjectionStatus::parse(&row.status).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid projection status value: {}", row.status),
            )
        })?;
        let user_id = UserId::new(row.user_id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid user id: {}", e))
        })?;

        Ok(ProjectionEntry {
            id: row.id,
            user_id,
            source: row.source,
            status,
            created_at: row.created_at,
            processed_at: row.processed_at,
            attempts: row.attempts,
            last_error: row.last_error,
            next_attempt_at: row.next_attempt_at,
        })
    }
}

/// Writes a new outbox row on any executor, a pool or an open transaction.
pub(crate) async fn insert_projection<'e, E>(
    executor: E,
    entry: &ProjectionEntry,
) -> Result<(), DomainError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO document_projection_outbox
            (id, user_id, source, status, attempts, created_at, next_attempt_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(entry.user_id.as_str())
    .bind(&entry.source)
    .bind(entry.status.as_str())
    .bind(entry.attempts)
    .bind(entry.created_at)
    .bind(entry.next_attempt_at)
    .execute(executor)
    .await
    .map_err(|e| db_error("Failed to enqueue projection", e))?;
    Ok(())
}

#[async_trait]
impl ProjectionOutbox for PostgresProjectionOutbox {
    async fn enqueue(&self, user_id: &UserId, source: &str) -> Result<ProjectionEntry, DomainError> {
        let entry = ProjectionEntry::new(user_id.clone(), source);
        insert_projection(&self.pool, &entry).await?;
        Ok(entry)
    }

    async fn get_pending(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProjectionEntry>, DomainError> {
        let rows: Vec<ProjectionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, source, status, attempts, last_error, created_at,
                   processed_at, next_attempt_at
            FROM document_projection_outbox
            WHERE status IN ('pending', 'failed') AND next_attempt_at <= $2
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch pending projections", e))?;

        rows.into_iter().map(ProjectionEntry::try_from).collect()
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE document_projection_outbox
            SET status = 'published', processed_at = NOW(), attempts = attempts + 1, last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark projection published", e))?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE document_projection_outbox
            SET status = 'failed', processed_at = NOW(), attempts = attempts + 1,
                last_error = $2, next_attempt_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark projection failed", e))?;
        Ok(())
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "DELETE FROM document_projection_outbox WHERE status = 'published' AND processed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to clean up projections", e))?;
        Ok(result.rows_affected())
    }
}
