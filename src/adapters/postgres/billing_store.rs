//! PostgreSQL implementation of BillingStore.
//!
//! Every change set is committed in one transaction:
//!
//! 1. Lock the user row (`SELECT ... FOR UPDATE`)
//! 2. Write the billing rows (customers, subscriptions, invoices, ...)
//! 3. Apply the summary changes through `UserAccount::apply_all`
//! 4. If the summary changed, update `users` and enqueue a document projection
//!
//! The row lock serializes concurrent events for the same user, so the
//! staleness guards compare against committed state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::db_error;
use super::projection_outbox::insert_projection;
use crate::domain::billing::{
    AccessStatus, BillingChange, ChangeSet, CheckoutSessionRecord, CommitOutcome, CustomerRecord,
    InvoiceRecord, PaymentMethodRecord, PlanTier, SubscriptionRecord, SubscriptionSummary,
    UserAccount,
};
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{BillingStore, ProjectionEntry};

/// PostgreSQL implementation of the BillingStore port.
pub struct PostgresBillingStore {
    pool: PgPool,
}

impl PostgresBillingStore {
    /// Creates a new PostgresBillingStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a user's billing summary.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    subscription_status: String,
    plan: Option<String>,
    quota: i32,
    used: i32,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    usage_period_start: Option<DateTime<Utc>>,
    subscription_synced_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let status: AccessStatus = row.subscription_status.parse().map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid subscription_status value: {}", e),
            )
        })?;
        let plan = row
            .plan
            .as_deref()
            .map(|p| {
                PlanTier::parse(p).ok_or_else(|| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan value: {}", p))
                })
            })
            .transpose()?;
        let id = UserId::new(row.id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid user id: {}", e))
        })?;

        Ok(UserAccount {
            id,
            email: row.email,
            summary: SubscriptionSummary {
                status,
                plan,
                quota: row.quota,
                used: row.used,
                stripe_customer_id: row.stripe_customer_id,
                stripe_subscription_id: row.stripe_subscription_id,
                current_period_end: row.current_period_end,
                cancel_at_period_end: row.cancel_at_period_end,
                usage_period_start: row.usage_period_start,
                subscription_synced_at: row.subscription_synced_at,
            },
        })
    }
}

const USER_COLUMNS: &str = r#"
    id, email, subscription_status, plan, quota, used,
    stripe_customer_id, stripe_subscription_id, current_period_end,
    cancel_at_period_end, usage_period_start, subscription_synced_at
"#;

async fn link_customer(
    tx: &mut Transaction<'_, Postgres>,
    record: &CustomerRecord,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO stripe_customers (customer_id, user_id, email, created_at, updated_at)
        VALUES ($1, $2, $3, NOW(), NOW())
        ON CONFLICT (customer_id) DO UPDATE SET
            user_id = EXCLUDED.user_id,
            email = COALESCE(EXCLUDED.email, stripe_customers.email),
            updated_at = NOW()
        "#,
    )
    .bind(&record.customer_id)
    .bind(record.user_id.as_str())
    .bind(&record.email)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to link customer", e))?;
    Ok(())
}

async fn upsert_subscription(
    tx: &mut Transaction<'_, Postgres>,
    record: &SubscriptionRecord,
) -> Result<(), DomainError> {
    // Older events never overwrite a row written by a newer one
    sqlx::query(
        r#"
        INSERT INTO stripe_subscriptions (
            subscription_id, customer_id, user_id, status, price_id, plan,
            current_period_start, current_period_end, cancel_at_period_end,
            canceled_at, last_event_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
        ON CONFLICT (subscription_id) DO UPDATE SET
            customer_id = EXCLUDED.customer_id,
            user_id = EXCLUDED.user_id,
            status = EXCLUDED.status,
            price_id = EXCLUDED.price_id,
            plan = EXCLUDED.plan,
            current_period_start = EXCLUDED.current_period_start,
            current_period_end = EXCLUDED.current_period_end,
            cancel_at_period_end = EXCLUDED.cancel_at_period_end,
            canceled_at = EXCLUDED.canceled_at,
            last_event_at = EXCLUDED.last_event_at,
            updated_at = NOW()
        WHERE stripe_subscriptions.last_event_at <= EXCLUDED.last_event_at
        "#,
    )
    .bind(&record.subscription_id)
    .bind(&record.customer_id)
    .bind(record.user_id.as_str())
    .bind(record.status.as_str())
    .bind(&record.price_id)
    .bind(record.plan.map(|p| p.as_str()))
    .bind(record.current_period_start)
    .bind(record.current_period_end)
    .bind(record.cancel_at_period_end)
    .bind(record.canceled_at)
    .bind(record.last_event_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to upsert subscription", e))?;
    Ok(())
}

async fn upsert_invoice(
    tx: &mut Transaction<'_, Postgres>,
    record: &InvoiceRecord,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO stripe_invoices (
            invoice_id, customer_id, user_id, subscription_id, status,
            amount_due, amount_paid, currency, period_start, period_end,
            hosted_invoice_url, last_event_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
        ON CONFLICT (invoice_id) DO UPDATE SET
            status = EXCLUDED.status,
            amount_due = EXCLUDED.amount_due,
            amount_paid = EXCLUDED.amount_paid,
            currency = EXCLUDED.currency,
            period_start = EXCLUDED.period_start,
            period_end = EXCLUDED.period_end,
            hosted_invoice_url = EXCLUDED.hosted_invoice_url,
            last_event_at = EXCLUDED.last_event_at,
            updated_at = NOW()
        WHERE stripe_invoices.last_event_at <= EXCLUDED.last_event_at
        "#,
    )
    .bind(&record.invoice_id)
    .bind(&record.customer_id)
    .bind(record.user_id.as_str())
    .bind(&record.subscription_id)
    .bind(&record.status)
    .bind(record.amount_due)
    .bind(record.amount_paid)
    .bind(&record.currency)
    .bind(record.period_start)
    .bind(record.period_end)
    .bind(&record.hosted_invoice_url)
    .bind(record.last_event_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to upsert invoice", e))?;
    Ok(())
}

async fn upsert_payment_method(
    tx: &mut Transaction<'_, Postgres>,
    record: &PaymentMethodRecord,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO stripe_payment_methods (
            payment_method_id, customer_id, user_id, method_type,
            card_brand, card_last4, card_exp_month, card_exp_year,
            detached_at, last_event_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, $9, NOW())
        ON CONFLICT (payment_method_id) DO UPDATE SET
            customer_id = EXCLUDED.customer_id,
            user_id = EXCLUDED.user_id,
            method_type = EXCLUDED.method_type,
            card_brand = EXCLUDED.card_brand,
            card_last4 = EXCLUDED.card_last4,
            card_exp_month = EXCLUDED.card_exp_month,
            card_exp_year = EXCLUDED.card_exp_year,
            detached_at = NULL,
            last_event_at = EXCLUDED.last_event_at,
            updated_at = NOW()
        WHERE stripe_payment_methods.last_event_at <= EXCLUDED.last_event_at
        "#,
    )
    .bind(&record.payment_method_id)
    .bind(&record.customer_id)
    .bind(record.user_id.as_str())
    .bind(&record.method_type)
    .bind(&record.card_brand)
    .bind(&record.card_last4)
    .bind(record.card_exp_month)
    .bind(record.card_exp_year)
    .bind(record.last_event_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to upsert payment method", e))?;
    Ok(())
}

async fn detach_payment_method(
    tx: &mut Transaction<'_, Postgres>,
    payment_method_id: &str,
    detached_at: DateTime<Utc>,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        UPDATE stripe_payment_methods
        SET detached_at = $2, is_default = FALSE, last_event_at = $2, updated_at = NOW()
        WHERE payment_method_id = $1 AND last_event_at <= $2
        "#,
    )
    .bind(payment_method_id)
    .bind(detached_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to detach payment method", e))?;
    Ok(())
}

async fn set_default_payment_method(
    tx: &mut Transaction<'_, Postgres>,
    customer_id: &str,
    payment_method_id: &str,
) -> Result<(), DomainError> {
    // Clear first so the partial unique index never sees two defaults
    sqlx::query(
        r#"
        UPDATE stripe_payment_methods
        SET is_default = FALSE, updated_at = NOW()
        WHERE customer_id = $1 AND is_default AND payment_method_id <> $2
        "#,
    )
    .bind(customer_id)
    .bind(payment_method_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to clear default payment method", e))?;

    sqlx::query(
        r#"
        UPDATE stripe_payment_methods
        SET is_default = TRUE, updated_at = NOW()
        WHERE customer_id = $1 AND payment_method_id = $2 AND detached_at IS NULL
        "#,
    )
    .bind(customer_id)
    .bind(payment_method_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to set default payment method", e))?;
    Ok(())
}

async fn upsert_checkout_session(
    tx: &mut Transaction<'_, Postgres>,
    record: &CheckoutSessionRecord,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO stripe_checkout_sessions (
            session_id, customer_id, user_id, subscription_id, mode,
            status, payment_status, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        ON CONFLICT (session_id) DO UPDATE SET
            customer_id = EXCLUDED.customer_id,
            subscription_id = EXCLUDED.subscription_id,
            status = EXCLUDED.status,
            payment_status = EXCLUDED.payment_status,
            updated_at = NOW()
        "#,
    )
    .bind(&record.session_id)
    .bind(&record.customer_id)
    .bind(record.user_id.as_str())
    .bind(&record.subscription_id)
    .bind(&record.mode)
    .bind(&record.status)
    .bind(&record.payment_status)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to upsert checkout session", e))?;
    Ok(())
}

async fn write_row(
    tx: &mut Transaction<'_, Postgres>,
    change: &BillingChange,
) -> Result<(), DomainError> {
    match change {
        BillingChange::LinkCustomer(record) => link_customer(tx, record).await,
        BillingChange::UpsertSubscription(record) => upsert_subscription(tx, record).await,
        BillingChange::UpsertInvoice(record) => upsert_invoice(tx, record).await,
        BillingChange::UpsertPaymentMethod(record) => upsert_payment_method(tx, record).await,
        BillingChange::DetachPaymentMethod {
            payment_method_id,
            detached_at,
        } => detach_payment_method(tx, payment_method_id, *detached_at).await,
        BillingChange::SetDefaultPaymentMethod {
            customer_id,
            payment_method_id,
        } => set_default_payment_method(tx, customer_id, payment_method_id).await,
        BillingChange::UpsertCheckoutSession(record) => upsert_checkout_session(tx, record).await,
        BillingChange::ApplySubscription(_)
        | BillingChange::EndSubscription { .. }
        | BillingChange::ResetUsage { .. }
        | BillingChange::SetAccessStatus { .. } => Ok(()),
    }
}

async fn update_summary(
    tx: &mut Transaction<'_, Postgres>,
    user: &UserAccount,
) -> Result<(), DomainError> {
    let s = &user.summary;
    sqlx::query(
        r#"
        UPDATE users SET
            subscription_status = $2,
            plan = $3,
            quota = $4,
            used = $5,
            stripe_customer_id = $6,
            stripe_subscription_id = $7,
            current_period_end = $8,
            cancel_at_period_end = $9,
            usage_period_start = $10,
            subscription_synced_at = $11,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user.id.as_str())
    .bind(s.status.as_str())
    .bind(s.plan.map(|p| p.as_str()))
    .bind(s.quota)
    .bind(s.used)
    .bind(&s.stripe_customer_id)
    .bind(&s.stripe_subscription_id)
    .bind(s.current_period_end)
    .bind(s.cancel_at_period_end)
    .bind(s.usage_period_start)
    .bind(s.subscription_synced_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("Failed to update user summary", e))?;
    Ok(())
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<UserAccount>, DomainError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to fetch user", e))?;

        row.map(UserAccount::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, DomainError> {
        // Oldest account wins when an address is shared
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1) ORDER BY created_at ASC LIMIT 1",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch user by email", e))?;

        row.map(UserAccount::try_from).transpose()
    }

    async fn find_user_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserId>, DomainError> {
        let user_id: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM stripe_customers WHERE customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to fetch customer mapping", e))?;

        user_id
            .map(|id| {
                UserId::new(id).map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Invalid user id: {}", e))
                })
            })
            .transpose()
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<CommitOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(changes.user_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to lock user", e))?;

        let mut user = match row {
            Some(row) => UserAccount::try_from(row)?,
            None => {
                return Err(DomainError::new(
                    ErrorCode::UserNotFound,
                    format!("User {} does not exist", changes.user_id),
                ))
            }
        };

        for change in &changes.changes {
            write_row(&mut tx, change).await?;
        }

        let outcome = user.apply_all(changes);

        if outcome.summary_changed {
            update_summary(&mut tx, &user).await?;

            let entry = ProjectionEntry::new(changes.user_id.clone(), changes.event_id.clone());
            insert_projection(&mut *tx, &entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        debug!(
            user_id = %changes.user_id,
            event_id = %changes.event_id,
            changes = changes.changes.len(),
            summary_changed = outcome.summary_changed,
            skipped = ?outcome.skipped,
            "Change set committed"
        );

        Ok(outcome)
    }

    async fn list_users(
        &self,
        after: Option<&UserId>,
        limit: i64,
    ) -> Result<Vec<UserAccount>, DomainError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE ($1::TEXT IS NULL OR id > $1) ORDER BY id ASC LIMIT $2",
            USER_COLUMNS
        ))
        .bind(after.map(|id| id.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list users", e))?;

        rows.into_iter().map(UserAccount::try_from).collect()
    }
}
