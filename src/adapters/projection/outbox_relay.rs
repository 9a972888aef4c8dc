//! ProjectionRelay - Background service that drains the projection outbox.
//!
//! Second half of the Transactional Outbox Pattern:
//! 1. `BillingStore::commit` writes the summary and an outbox entry together
//! 2. **ProjectionRelay polls the outbox and merges user documents** ← This module
//!
//! The relay never trusts the entry for content. It re-reads the user row and
//! projects it as of now, so a late or repeated entry writes current state.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 1s | How often to check for pending entries |
//! | `batch_size` | 50 | Max entries per poll cycle |
//! | `max_backoff` | 5m | Ceiling on the retry delay of a failing entry |
//! | `alert_after_attempts` | 10 | Failures beyond this are logged at error level |
//! | `cleanup_interval` | 1h | How often old rows are purged |
//!
//! ## Retries
//!
//! A failed entry is deferred by `poll_interval * 2^(attempts - 1)`, capped at
//! `max_backoff`, and retried indefinitely. An outage of any length therefore
//! ends with the document converging once the store is reachable again.
//!
//! ## Graceful Shutdown
//!
//! The relay listens for a shutdown signal and drains one final batch
//! before stopping.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{
    BillingStore, DocumentStore, ProjectionEntry, ProjectionOutbox, WebhookEventRepository,
};

/// Configuration for the ProjectionRelay service.
#[derive(Debug, Clone)]
pub struct ProjectionRelayConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_backoff: Duration,
    pub alert_after_attempts: i32,
    pub cleanup_interval: Duration,
    /// Published outbox entries older than this are deleted.
    pub outbox_retention: chrono::Duration,
    /// Ledger records older than this are deleted.
    pub ledger_retention: chrono::Duration,
}

impl Default for ProjectionRelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 50,
            max_backoff: Duration::from_secs(300),
            alert_after_attempts: 10,
            cleanup_interval: Duration::from_secs(3600),
            outbox_retention: chrono::Duration::days(7),
            ledger_retention: chrono::Duration::days(90),
        }
    }
}

impl ProjectionRelayConfig {
    /// Builds the relay settings from the `sync` config section.
    pub fn from_sync(sync: &SyncConfig) -> Self {
        Self {
            poll_interval: sync.relay_poll_interval(),
            batch_size: sync.relay_batch_size,
            max_backoff: sync.relay_max_backoff(),
            alert_after_attempts: sync.relay_alert_after_attempts,
            outbox_retention: chrono::Duration::days(sync.outbox_retention_days),
            ledger_retention: chrono::Duration::days(sync.ledger_retention_days),
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: i64) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_alert_after_attempts(mut self, attempts: i32) -> Self {
        self.alert_after_attempts = attempts;
        self
    }

    /// Delay before the next try of an entry that has now failed `attempts` times.
    pub fn retry_delay(&self, attempts: i32) -> Duration {
        let doublings = attempts.saturating_sub(1).clamp(0, 20) as u32;
        self.poll_interval
            .saturating_mul(1u32 << doublings)
            .min(self.max_backoff)
    }
}

/// Counts from one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayCycle {
    pub published: usize,
    pub failed: usize,
}

/// Background service that projects user summaries into the document store.
pub struct ProjectionRelay {
    outbox: Arc<dyn ProjectionOutbox>,
    billing: Arc<dyn BillingStore>,
    documents: Arc<dyn DocumentStore>,
    ledger: Option<Arc<dyn WebhookEventRepository>>,
    config: ProjectionRelayConfig,
}

impl ProjectionRelay {
    pub fn new(
        outbox: Arc<dyn ProjectionOutbox>,
        billing: Arc<dyn BillingStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            outbox,
            billing,
            documents,
            ledger: None,
            config: ProjectionRelayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProjectionRelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Also purge old idempotency ledger records during cleanup.
    pub fn with_ledger(mut self, ledger: Arc<dyn WebhookEventRepository>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Run the relay loop until shutdown signal is received.
    ///
    /// A failing cycle is logged and retried on the next tick; only the
    /// shutdown signal ends the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        let mut poll = time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut cleanup = time::interval(self.config.cleanup_interval);
        cleanup.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Projection relay started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Drain one final batch then exit
                        self.process_batch().await?;
                        info!("Projection relay stopped");
                        return Ok(());
                    }
                }

                _ = poll.tick() => {
                    if let Err(e) = self.process_batch().await {
                        warn!(error = %e, "Projection relay cycle failed");
                    }
                }

                _ = cleanup.tick() => {
                    if let Err(e) = self.cleanup().await {
                        warn!(error = %e, "Projection relay cleanup failed");
                    }
                }
            }
        }
    }

    /// Process a single batch of pending entries.
    pub async fn process_batch(&self) -> Result<RelayCycle, DomainError> {
        self.process_batch_at(Utc::now()).await
    }

    /// Process the entries due at `now`.
    pub async fn process_batch_at(&self, now: DateTime<Utc>) -> Result<RelayCycle, DomainError> {
        let entries = self.outbox.get_pending(self.config.batch_size, now).await?;
        let mut cycle = RelayCycle::default();

        for entry in entries {
            match self.project(&entry).await {
                Ok(()) => {
                    self.outbox.mark_published(entry.id).await?;
                    cycle.published += 1;
                }
                Err(e) => {
                    let attempts = entry.attempts.saturating_add(1);
                    let delay = self.config.retry_delay(attempts);
                    let retry_at = now + chrono::Duration::milliseconds(delay.as_millis() as i64);
                    if attempts >= self.config.alert_after_attempts {
                        error!(
                            entry_id = %entry.id,
                            user_id = %entry.user_id,
                            source = %entry.source,
                            attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "User document projection keeps failing; document is stale"
                        );
                    } else {
                        warn!(
                            entry_id = %entry.id,
                            user_id = %entry.user_id,
                            source = %entry.source,
                            attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "User document projection failed"
                        );
                    }
                    self.outbox
                        .mark_failed(entry.id, &e.to_string(), retry_at)
                        .await?;
                    cycle.failed += 1;
                }
            }
        }

        if cycle.published + cycle.failed > 0 {
            debug!(published = cycle.published, failed = cycle.failed, "Projection batch done");
        }
        Ok(cycle)
    }

    /// Run exactly one poll cycle (for testing).
    pub async fn poll_once(&self) -> Result<RelayCycle, DomainError> {
        self.process_batch().await
    }

    /// Run one poll cycle as if the clock read `now` (for testing).
    pub async fn poll_at(&self, now: DateTime<Utc>) -> Result<RelayCycle, DomainError> {
        self.process_batch_at(now).await
    }

    async fn project(&self, entry: &ProjectionEntry) -> Result<(), DomainError> {
        let user = self
            .billing
            .find_user(&entry.user_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::UserNotFound,
                    format!("User {} no longer exists", entry.user_id),
                )
            })?;

        self.documents
            .merge_user(&user.id, &user.document(Utc::now()))
            .await
    }

    /// Deletes published outbox entries and ledger records past retention.
    pub async fn cleanup(&self) -> Result<(), DomainError> {
        let now = Utc::now();
        let outbox_deleted = self.outbox.cleanup(now - self.config.outbox_retention).await?;
        let ledger_deleted = match &self.ledger {
            Some(ledger) => ledger.delete_before(now - self.config.ledger_retention).await?,
            None => 0,
        };

        if outbox_deleted + ledger_deleted > 0 {
            info!(outbox_deleted, ledger_deleted, "Old sync records purged");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryBillingStore, InMemoryDocumentStore, InMemoryWebhookEventRepository,
    };
    use crate::domain::billing::{AccessStatus, UserAccount};
    use crate::domain::foundation::UserId;
    use crate::ports::{ProjectionStatus, WebhookEventRecord};

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    async fn store_with_users(ids: &[&str]) -> Arc<InMemoryBillingStore> {
        let store = Arc::new(InMemoryBillingStore::new());
        for id in ids {
            store
                .insert_user(UserAccount::new(uid(id), Some(format!("{}@example.com", id))))
                .await;
        }
        store
    }

    fn relay(
        store: &Arc<InMemoryBillingStore>,
        documents: &Arc<InMemoryDocumentStore>,
    ) -> ProjectionRelay {
        ProjectionRelay::new(store.clone(), store.clone(), documents.clone())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Polling
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn poll_once_projects_pending_users() {
        let store = store_with_users(&["uid-1", "uid-2"]).await;
        let documents = Arc::new(InMemoryDocumentStore::new());
        store.enqueue(&uid("uid-1"), "evt_1").await.unwrap();
        store.enqueue(&uid("uid-2"), "evt_2").await.unwrap();

        let cycle = relay(&store, &documents).poll_once().await.unwrap();

        assert_eq!(cycle, RelayCycle { published: 2, failed: 0 });
        let doc = documents.document("uid-1").await.unwrap();
        assert_eq!(doc.subscription.status, AccessStatus::Trial);
        assert!(doc.subscription_updated_at.is_some());
        assert!(store
            .outbox_entries()
            .await
            .iter()
            .all(|e| e.status == ProjectionStatus::Published));
    }

    #[tokio::test]
    async fn poll_once_respects_batch_size() {
        let store = store_with_users(&["a", "b", "c"]).await;
        let documents = Arc::new(InMemoryDocumentStore::new());
        for id in ["a", "b", "c"] {
            store.enqueue(&uid(id), "evt").await.unwrap();
        }
        let relay = relay(&store, &documents)
            .with_config(ProjectionRelayConfig::default().with_batch_size(2));

        assert_eq!(relay.poll_once().await.unwrap().published, 2);
        assert_eq!(relay.poll_once().await.unwrap().published, 1);
        assert_eq!(relay.poll_once().await.unwrap().published, 0);
    }

    #[tokio::test]
    async fn poll_once_with_no_pending_returns_zero() {
        let store = store_with_users(&[]).await;
        let documents = Arc::new(InMemoryDocumentStore::new());

        let cycle = relay(&store, &documents).poll_once().await.unwrap();

        assert_eq!(cycle, RelayCycle::default());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failures
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn failed_write_is_retried_once_its_delay_passes() {
        let store = store_with_users(&["uid-1"]).await;
        let documents = Arc::new(InMemoryDocumentStore::new());
        store.enqueue(&uid("uid-1"), "evt_1").await.unwrap();
        documents.fail_next_writes(1);
        let relay = relay(&store, &documents);
        let t0 = Utc::now();

        let first = relay.poll_at(t0).await.unwrap();
        assert_eq!(first, RelayCycle { published: 0, failed: 1 });
        let entry = &store.outbox_entries().await[0];
        assert_eq!(entry.status, ProjectionStatus::Failed);
        assert!(entry.last_error.is_some());
        assert_eq!(entry.next_attempt_at, t0 + chrono::Duration::seconds(1));
        assert!(documents.document("uid-1").await.is_none());

        // Not due yet
        assert_eq!(relay.poll_at(t0).await.unwrap(), RelayCycle::default());

        let second = relay.poll_at(t0 + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(second.published, 1);
        assert!(documents.document("uid-1").await.is_some());
        assert_eq!(store.outbox_entries().await[0].attempts, 2);
    }

    #[tokio::test]
    async fn long_outage_still_converges() {
        let store = store_with_users(&["uid-1"]).await;
        let documents = Arc::new(InMemoryDocumentStore::new());
        store.enqueue(&uid("uid-1"), "evt_1").await.unwrap();
        let config = ProjectionRelayConfig::from_sync(&SyncConfig::default());
        // Fails well past the alert threshold
        let failures = config.alert_after_attempts as usize + 5;
        documents.fail_next_writes(failures);
        let relay = relay(&store, &documents).with_config(config);
        let t0 = Utc::now();

        let mut failed = 0;
        let mut published = 0;
        // Poll every second for two simulated hours
        for second in 0..7_200 {
            let cycle = relay.poll_at(t0 + chrono::Duration::seconds(second)).await.unwrap();
            failed += cycle.failed;
            published += cycle.published;
            if published > 0 {
                break;
            }
        }

        assert_eq!(failed, failures);
        assert_eq!(published, 1);
        assert!(documents.document("uid-1").await.is_some());
        assert_eq!(store.outbox_entries().await[0].status, ProjectionStatus::Published);
    }

    #[test]
    fn retry_delay_doubles_up_to_the_ceiling() {
        let config = ProjectionRelayConfig::default();

        assert_eq!(config.retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.retry_delay(2), Duration::from_secs(2));
        assert_eq!(config.retry_delay(4), Duration::from_secs(8));
        assert_eq!(config.retry_delay(9), Duration::from_secs(256));
        assert_eq!(config.retry_delay(10), Duration::from_secs(300));
        assert_eq!(config.retry_delay(i32::MAX), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn missing_user_marks_entry_failed() {
        let store = store_with_users(&[]).await;
        let documents = Arc::new(InMemoryDocumentStore::new());
        store.enqueue(&uid("ghost"), "evt_1").await.unwrap();

        let cycle = relay(&store, &documents).poll_once().await.unwrap();

        assert_eq!(cycle.failed, 1);
        assert_eq!(documents.write_count(), 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let store = store_with_users(&["uid-1"]).await;
        let documents = Arc::new(InMemoryDocumentStore::new());
        store.enqueue(&uid("uid-1"), "evt_1").await.unwrap();
        let relay = relay(&store, &documents).with_config(
            ProjectionRelayConfig::default().with_poll_interval(Duration::from_millis(10)),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { relay.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert!(documents.write_count() >= 1);
    }

    #[tokio::test]
    async fn cleanup_purges_old_ledger_records() {
        let store = store_with_users(&[]).await;
        let documents = Arc::new(InMemoryDocumentStore::new());
        let ledger = Arc::new(InMemoryWebhookEventRepository::new());
        let mut old = WebhookEventRecord::success("evt_old", "invoice.paid", serde_json::json!({}));
        old.processed_at = Utc::now() - chrono::Duration::days(120);
        ledger.save(old).await.unwrap();
        ledger
            .save(WebhookEventRecord::success("evt_new", "invoice.paid", serde_json::json!({})))
            .await
            .unwrap();

        relay(&store, &documents)
            .with_ledger(ledger.clone())
            .cleanup()
            .await
            .unwrap();

        assert_eq!(ledger.len().await, 1);
        assert!(ledger.find_by_event_id("evt_new").await.unwrap().is_some());
    }

    #[test]
    fn config_defaults_are_reasonable() {
        let config = ProjectionRelayConfig::default();

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_backoff, Duration::from_secs(300));
        assert_eq!(config.alert_after_attempts, 10);
    }
}
