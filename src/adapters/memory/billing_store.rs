//! In-memory billing store and projection outbox.
//!
//! One struct implements both ports because `commit` enqueues the projection
//! atomically with the summary change. A single mutex held for the whole
//! commit plays the role of the database transaction.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::billing::{
    BillingChange, ChangeSet, CheckoutSessionRecord, CommitOutcome, CustomerRecord,
    InvoiceRecord, PaymentMethodRecord, SubscriptionRecord, UserAccount,
};
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{BillingStore, ProjectionEntry, ProjectionOutbox, ProjectionStatus};

/// Payment method row with its default and detach flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPaymentMethod {
    pub record: PaymentMethodRecord,
    pub is_default: bool,
    pub detached_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    users: BTreeMap<String, UserAccount>,
    customers: HashMap<String, CustomerRecord>,
    subscriptions: HashMap<String, SubscriptionRecord>,
    invoices: HashMap<String, InvoiceRecord>,
    payment_methods: HashMap<String, StoredPaymentMethod>,
    checkout_sessions: HashMap<String, CheckoutSessionRecord>,
    outbox: Vec<ProjectionEntry>,
    fail_commits: bool,
}

impl State {
    fn write_row(&mut self, change: &BillingChange) {
        match change {
            BillingChange::LinkCustomer(record) => {
                let email = record.email.clone().or_else(|| {
                    self.customers
                        .get(&record.customer_id)
                        .and_then(|c| c.email.clone())
                });
                self.customers.insert(
                    record.customer_id.clone(),
                    CustomerRecord {
                        email,
                        ..record.clone()
                    },
                );
            }
            BillingChange::UpsertSubscription(record) => {
                let newer = self
                    .subscriptions
                    .get(&record.subscription_id)
                    .map_or(true, |existing| existing.last_event_at <= record.last_event_at);
                if newer {
                    self.subscriptions
                        .insert(record.subscription_id.clone(), record.clone());
                }
            }
            BillingChange::UpsertInvoice(record) => {
                let newer = self
                    .invoices
                    .get(&record.invoice_id)
                    .map_or(true, |existing| existing.last_event_at <= record.last_event_at);
                if newer {
                    self.invoices.insert(record.invoice_id.clone(), record.clone());
                }
            }
            BillingChange::UpsertPaymentMethod(record) => {
                let existing = self.payment_methods.get(&record.payment_method_id);
                if existing.map_or(false, |pm| pm.record.last_event_at > record.last_event_at) {
                    return;
                }
                let is_default = existing.map_or(false, |pm| pm.is_default);
                self.payment_methods.insert(
                    record.payment_method_id.clone(),
                    StoredPaymentMethod {
                        record: record.clone(),
                        is_default,
                        detached_at: None,
                    },
                );
            }
            BillingChange::DetachPaymentMethod {
                payment_method_id,
                detached_at,
            } => {
                if let Some(pm) = self.payment_methods.get_mut(payment_method_id) {
                    if pm.record.last_event_at <= *detached_at {
                        pm.detached_at = Some(*detached_at);
                        pm.is_default = false;
                        pm.record.last_event_at = *detached_at;
                    }
                }
            }
            BillingChange::SetDefaultPaymentMethod {
                customer_id,
                payment_method_id,
            } => {
                for (id, pm) in self.payment_methods.iter_mut() {
                    if pm.record.customer_id == *customer_id {
                        pm.is_default = id == payment_method_id && pm.detached_at.is_none();
                    }
                }
            }
            BillingChange::UpsertCheckoutSession(record) => {
                self.checkout_sessions
                    .insert(record.session_id.clone(), record.clone());
            }
            BillingChange::ApplySubscription(_)
            | BillingChange::EndSubscription { .. }
            | BillingChange::ResetUsage { .. }
            | BillingChange::SetAccessStatus { .. } => {}
        }
    }
}

/// In-memory implementation of `BillingStore` and `ProjectionOutbox`.
#[derive(Default)]
pub struct InMemoryBillingStore {
    state: Mutex<State>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Seeds a user row.
    pub async fn insert_user(&self, user: UserAccount) {
        self.state
            .lock()
            .await
            .users
            .insert(user.id.as_str().to_string(), user);
    }

    /// Makes every subsequent commit fail with a database error.
    pub async fn fail_commits(&self, fail: bool) {
        self.state.lock().await.fail_commits = fail;
    }

    pub async fn user(&self, id: &str) -> Option<UserAccount> {
        self.state.lock().await.users.get(id).cloned()
    }

    pub async fn customer(&self, customer_id: &str) -> Option<CustomerRecord> {
        self.state.lock().await.customers.get(customer_id).cloned()
    }

    pub async fn subscription(&self, subscription_id: &str) -> Option<SubscriptionRecord> {
        self.state
            .lock()
            .await
            .subscriptions
            .get(subscription_id)
            .cloned()
    }

    pub async fn invoice(&self, invoice_id: &str) -> Option<InvoiceRecord> {
        self.state.lock().await.invoices.get(invoice_id).cloned()
    }

    pub async fn payment_method(&self, payment_method_id: &str) -> Option<StoredPaymentMethod> {
        self.state
            .lock()
            .await
            .payment_methods
            .get(payment_method_id)
            .cloned()
    }

    pub async fn checkout_session(&self, session_id: &str) -> Option<CheckoutSessionRecord> {
        self.state
            .lock()
            .await
            .checkout_sessions
            .get(session_id)
            .cloned()
    }

    pub async fn outbox_entries(&self) -> Vec<ProjectionEntry> {
        self.state.lock().await.outbox.clone()
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn find_user(&self, user_id: &UserId) -> Result<Option<UserAccount>, DomainError> {
        Ok(self.state.lock().await.users.get(user_id.as_str()).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserAccount>, DomainError> {
        let wanted = email.trim().to_lowercase();
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|u| {
                u.email
                    .as_deref()
                    .map_or(false, |e| e.to_lowercase() == wanted)
            })
            .cloned())
    }

    async fn find_user_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserId>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .customers
            .get(customer_id)
            .map(|c| c.user_id.clone()))
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<CommitOutcome, DomainError> {
        let mut state = self.state.lock().await;
        if state.fail_commits {
            return Err(DomainError::database("Injected commit failure"));
        }

        let mut user = state
            .users
            .get(changes.user_id.as_str())
            .cloned()
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::UserNotFound,
                    format!("User {} does not exist", changes.user_id),
                )
            })?;

        for change in &changes.changes {
            state.write_row(change);
        }

        let outcome = user.apply_all(changes);
        if outcome.summary_changed {
            state
                .outbox
                .push(ProjectionEntry::new(user.id.clone(), changes.event_id.clone()));
            state.users.insert(user.id.as_str().to_string(), user);
        }

        Ok(outcome)
    }

    async fn list_users(
        &self,
        after: Option<&UserId>,
        limit: i64,
    ) -> Result<Vec<UserAccount>, DomainError> {
        let state = self.state.lock().await;
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .users
            .values()
            .filter(|u| after.map_or(true, |a| u.id.as_str() > a.as_str()))
            .take(take)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProjectionOutbox for InMemoryBillingStore {
    async fn enqueue(&self, user_id: &UserId, source: &str) -> Result<ProjectionEntry, DomainError> {
        let entry = ProjectionEntry::new(user_id.clone(), source);
        self.state.lock().await.outbox.push(entry.clone());
        Ok(entry)
    }

    async fn get_pending(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProjectionEntry>, DomainError> {
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state
            .lock()
            .await
            .outbox
            .iter()
            .filter(|e| e.is_due(now))
            .take(take)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), DomainError> {
        if let Some(entry) = self.state.lock().await.outbox.iter_mut().find(|e| e.id == id) {
            entry.mark_published();
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if let Some(entry) = self.state.lock().await.outbox.iter_mut().find(|e| e.id == id) {
            entry.mark_failed(error, retry_at);
        }
        Ok(())
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut state = self.state.lock().await;
        let before = state.outbox.len();
        state.outbox.retain(|e| {
            !(e.status == ProjectionStatus::Published
                && e.processed_at.map_or(false, |t| t < older_than))
        });
        Ok((before - state.outbox.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{
        AccessStatus, PlanTier, SubscriptionStatus, SubscriptionSummaryUpdate,
    };
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_704_067_200 + secs, 0).unwrap()
    }

    fn uid() -> UserId {
        UserId::new("uid-1").unwrap()
    }

    async fn store_with_user() -> InMemoryBillingStore {
        let store = InMemoryBillingStore::new();
        store
            .insert_user(UserAccount::new(uid(), Some("Ada@Example.com".to_string())))
            .await;
        store
    }

    fn subscription(status: SubscriptionStatus, at: DateTime<Utc>) -> SubscriptionRecord {
        SubscriptionRecord {
            subscription_id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            user_id: uid(),
            status,
            price_id: Some("price_professional_monthly".to_string()),
            plan: Some(PlanTier::Professional),
            current_period_start: Some(at),
            current_period_end: Some(at + Duration::days(30)),
            cancel_at_period_end: false,
            canceled_at: None,
            last_event_at: at,
        }
    }

    #[tokio::test]
    async fn commit_for_unknown_user_fails() {
        let store = InMemoryBillingStore::new();
        let set = ChangeSet::new(uid(), "evt_1", t(0));

        let err = store.commit(&set).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::UserNotFound);
    }

    #[tokio::test]
    async fn summary_change_enqueues_projection() {
        let store = store_with_user().await;
        let set = ChangeSet::new(uid(), "evt_1", t(0)).with(BillingChange::ApplySubscription(
            SubscriptionSummaryUpdate {
                subscription_id: "sub_1".to_string(),
                customer_id: "cus_1".to_string(),
                status: AccessStatus::Active,
                plan: Some(PlanTier::Starter),
                quota: 3,
                current_period_end: None,
                cancel_at_period_end: false,
            },
        ));

        let outcome = store.commit(&set).await.unwrap();

        assert!(outcome.summary_changed);
        let outbox = store.outbox_entries().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].source, "evt_1");
        assert_eq!(store.user("uid-1").await.unwrap().summary.quota, 3);
    }

    #[tokio::test]
    async fn row_only_change_enqueues_nothing() {
        let store = store_with_user().await;
        let set = ChangeSet::new(uid(), "evt_1", t(0))
            .with(BillingChange::UpsertSubscription(subscription(SubscriptionStatus::Active, t(0))));

        store.commit(&set).await.unwrap();

        assert!(store.outbox_entries().await.is_empty());
        assert!(store.subscription("sub_1").await.is_some());
    }

    #[tokio::test]
    async fn older_subscription_row_does_not_overwrite_newer() {
        let store = store_with_user().await;
        let newer = ChangeSet::new(uid(), "evt_2", t(100)).with(BillingChange::UpsertSubscription(
            subscription(SubscriptionStatus::Canceled, t(100)),
        ));
        let older = ChangeSet::new(uid(), "evt_1", t(0)).with(BillingChange::UpsertSubscription(
            subscription(SubscriptionStatus::Active, t(0)),
        ));

        store.commit(&newer).await.unwrap();
        store.commit(&older).await.unwrap();

        assert_eq!(
            store.subscription("sub_1").await.unwrap().status,
            SubscriptionStatus::Canceled
        );
    }

    #[tokio::test]
    async fn only_one_default_payment_method_per_customer() {
        let store = store_with_user().await;
        let pm = |id: &str| PaymentMethodRecord {
            payment_method_id: id.to_string(),
            customer_id: "cus_1".to_string(),
            user_id: uid(),
            method_type: "card".to_string(),
            card_brand: Some("visa".to_string()),
            card_last4: Some("4242".to_string()),
            card_exp_month: Some(12),
            card_exp_year: Some(2030),
            last_event_at: t(0),
        };
        let default = |id: &str| BillingChange::SetDefaultPaymentMethod {
            customer_id: "cus_1".to_string(),
            payment_method_id: id.to_string(),
        };
        let set = ChangeSet::new(uid(), "evt_1", t(0))
            .with(BillingChange::UpsertPaymentMethod(pm("pm_a")))
            .with(BillingChange::UpsertPaymentMethod(pm("pm_b")))
            .with(default("pm_a"))
            .with(default("pm_b"));

        store.commit(&set).await.unwrap();

        assert!(!store.payment_method("pm_a").await.unwrap().is_default);
        assert!(store.payment_method("pm_b").await.unwrap().is_default);
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = store_with_user().await;

        let found = store.find_user_by_email(" ada@example.COM ").await.unwrap();

        assert_eq!(found.unwrap().id, uid());
    }

    #[tokio::test]
    async fn list_users_pages_by_id() {
        let store = InMemoryBillingStore::new();
        for id in ["c", "a", "b"] {
            store
                .insert_user(UserAccount::new(UserId::new(id).unwrap(), None))
                .await;
        }

        let first = store.list_users(None, 2).await.unwrap();
        let rest = store
            .list_users(Some(&first[1].id), 2)
            .await
            .unwrap();

        assert_eq!(
            first.iter().map(|u| u.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id.as_str(), "c");
    }

    #[tokio::test]
    async fn failed_entry_waits_for_its_retry_time() {
        let store = store_with_user().await;
        let entry = store.enqueue(&uid(), "reconcile").await.unwrap();
        let now = Utc::now();
        assert_eq!(store.get_pending(10, now).await.unwrap().len(), 1);

        let retry_at = now + chrono::Duration::seconds(8);
        store.mark_failed(entry.id, "boom", retry_at).await.unwrap();
        assert!(store.get_pending(10, now).await.unwrap().is_empty());

        let due = store.get_pending(10, retry_at).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
    }

    #[tokio::test]
    async fn injected_failure_mutates_nothing() {
        let store = store_with_user().await;
        store.fail_commits(true).await;
        let set = ChangeSet::new(uid(), "evt_1", t(0))
            .with(BillingChange::SetAccessStatus {
                subscription_id: "sub_1".to_string(),
                status: AccessStatus::PastDue,
            });

        assert!(store.commit(&set).await.is_err());
        assert_eq!(
            store.user("uid-1").await.unwrap().summary.status,
            AccessStatus::Trial
        );
    }
}
