//! `stripe_webhook_events` ledger.
//!
//! `event_id` is the primary key. `save` inserts with `ON CONFLICT DO NOTHING
//! RETURNING`, so of two concurrent deliveries exactly one gets a row back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::db_error;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{LedgerResult, SaveResult, WebhookEventRecord, WebhookEventRepository};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    event_id: String,
    event_type: String,
    result: String,
    message: Option<String>,
    payload: serde_json::Value,
    processed_at: DateTime<Utc>,
}

impl LedgerRow {
    fn into_record(self) -> Result<WebhookEventRecord, DomainError> {
        let Some(result) = LedgerResult::parse(&self.result) else {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("ledger row {} has result '{}'", self.event_id, self.result),
            ));
        };
        Ok(WebhookEventRecord {
            event_id: self.event_id,
            event_type: self.event_type,
            processed_at: self.processed_at,
            result,
            message: self.message,
            payload: self.payload,
        })
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        sqlx::query_as::<_, LedgerRow>(
            "SELECT event_id, event_type, result, message, payload, processed_at \
             FROM stripe_webhook_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read ledger", e))?
        .map(LedgerRow::into_record)
        .transpose()
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO stripe_webhook_events
                (event_id, event_type, result, message, payload, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING event_id
            "#,
        )
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(record.result.as_str())
        .bind(&record.message)
        .bind(&record.payload)
        .bind(record.processed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record webhook event", e))?;

        Ok(match inserted {
            Some(_) => SaveResult::Inserted,
            None => SaveResult::AlreadyExists,
        })
    }

    async fn update_result(
        &self,
        event_id: &str,
        result: LedgerResult,
        message: Option<String>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE stripe_webhook_events \
             SET result = $2, message = $3, processed_at = NOW() \
             WHERE event_id = $1",
        )
        .bind(event_id)
        .bind(result.as_str())
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to rewrite ledger outcome", e))?;
        Ok(())
    }

    async fn delete_before(&self, timestamp: DateTime<Utc>) -> Result<u64, DomainError> {
        let done = sqlx::query("DELETE FROM stripe_webhook_events WHERE processed_at < $1")
            .bind(timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to prune ledger", e))?;
        Ok(done.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(result: &str) -> LedgerRow {
        LedgerRow {
            event_id: "evt_1".to_string(),
            event_type: "invoice.paid".to_string(),
            result: result.to_string(),
            message: Some("parked".to_string()),
            payload: serde_json::json!({"id": "evt_1"}),
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn known_result_maps_to_record() {
        let record = row("dead_lettered").into_record().unwrap();

        assert_eq!(record.result, LedgerResult::DeadLettered);
        assert_eq!(record.message.as_deref(), Some("parked"));
    }

    #[test]
    fn unknown_result_is_a_database_error() {
        let err = row("failed").into_record().unwrap_err();

        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.message.contains("evt_1"));
    }
}
