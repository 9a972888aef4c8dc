//! ReconcileDocumentsHandler - Rewrites user documents that drifted from Postgres.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::billing::UserAccount;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{BillingStore, DocumentStore};

/// Divergent user ids listed in a report are capped at this many.
const MAX_REPORTED_IDS: usize = 100;

/// Command to reconcile user documents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileDocumentsCommand {
    /// Only report divergence, write nothing.
    #[serde(default)]
    pub dry_run: bool,
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub scanned: usize,
    pub in_sync: usize,
    /// Documents that differ from the summary (including missing ones).
    pub divergent: usize,
    /// Documents that did not exist or had no subscription fields.
    pub missing: usize,
    pub rewritten: usize,
    pub failed: usize,
    pub divergent_user_ids: Vec<String>,
}

enum Check {
    InSync,
    Divergent { missing: bool, rewritten: bool },
    Failed,
}

/// Handler for document reconciliation.
pub struct ReconcileDocumentsHandler {
    billing: Arc<dyn BillingStore>,
    documents: Arc<dyn DocumentStore>,
    page_size: i64,
    concurrency: usize,
}

impl ReconcileDocumentsHandler {
    pub fn new(
        billing: Arc<dyn BillingStore>,
        documents: Arc<dyn DocumentStore>,
        page_size: i64,
        concurrency: usize,
    ) -> Self {
        Self {
            billing,
            documents,
            page_size: page_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn handle(
        &self,
        cmd: ReconcileDocumentsCommand,
    ) -> Result<ReconcileReport, DomainError> {
        let mut report = ReconcileReport {
            dry_run: cmd.dry_run,
            ..ReconcileReport::default()
        };
        let dry_run = cmd.dry_run;
        let mut after: Option<UserId> = None;

        loop {
            let page = self.billing.list_users(after.as_ref(), self.page_size).await?;
            let Some(last) = page.last() else { break };
            after = Some(last.id.clone());
            let full_page = page.len() as i64 == self.page_size;

            let checks: Vec<(UserId, Check)> = stream::iter(page)
                .map(|user| async move {
                    let check = self.check(&user, dry_run).await;
                    (user.id, check)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (user_id, check) in checks {
                report.scanned += 1;
                match check {
                    Check::InSync => report.in_sync += 1,
                    Check::Divergent { missing, rewritten } => {
                        report.divergent += 1;
                        if missing {
                            report.missing += 1;
                        }
                        if rewritten {
                            report.rewritten += 1;
                        }
                        if report.divergent_user_ids.len() < MAX_REPORTED_IDS {
                            report.divergent_user_ids.push(user_id.to_string());
                        }
                    }
                    Check::Failed => report.failed += 1,
                }
            }

            if !full_page {
                break;
            }
        }

        report.divergent_user_ids.sort();
        info!(
            dry_run = report.dry_run,
            scanned = report.scanned,
            divergent = report.divergent,
            rewritten = report.rewritten,
            failed = report.failed,
            "Document reconciliation finished"
        );
        Ok(report)
    }

    async fn check(&self, user: &UserAccount, dry_run: bool) -> Check {
        let expected = user.document(Utc::now());
        let actual = match self.documents.get_user(&user.id).await {
            Ok(actual) => actual,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Failed to read user document");
                return Check::Failed;
            }
        };

        let missing = match &actual {
            Some(doc) if doc.same_state(&expected) => return Check::InSync,
            Some(_) => false,
            None => true,
        };
        if dry_run {
            return Check::Divergent {
                missing,
                rewritten: false,
            };
        }

        match self.documents.merge_user(&user.id, &expected).await {
            Ok(()) => Check::Divergent {
                missing,
                rewritten: true,
            },
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Failed to rewrite user document");
                Check::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBillingStore, InMemoryDocumentStore};
    use crate::domain::billing::{AccessStatus, PlanTier};

    fn account(id: &str, status: AccessStatus, quota: i32) -> UserAccount {
        let mut user = UserAccount::new(UserId::new(id).unwrap(), None);
        user.summary.status = status;
        user.summary.quota = quota;
        if quota > 0 {
            user.summary.plan = Some(PlanTier::Starter);
        }
        user
    }

    struct Fixture {
        billing: Arc<InMemoryBillingStore>,
        documents: Arc<InMemoryDocumentStore>,
    }

    /// u1 in sync, u2 stale document, u3 without a document.
    async fn fixture() -> Fixture {
        let billing = Arc::new(InMemoryBillingStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());

        let u1 = account("u1", AccessStatus::Active, 3);
        documents.put("u1", u1.document(Utc::now())).await;
        billing.insert_user(u1).await;

        let u2 = account("u2", AccessStatus::Inactive, 0);
        documents
            .put("u2", account("u2", AccessStatus::Active, 3).document(Utc::now()))
            .await;
        billing.insert_user(u2).await;

        billing.insert_user(account("u3", AccessStatus::Trial, 0)).await;

        Fixture { billing, documents }
    }

    fn handler(f: &Fixture, page_size: i64) -> ReconcileDocumentsHandler {
        ReconcileDocumentsHandler::new(f.billing.clone(), f.documents.clone(), page_size, 2)
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let f = fixture().await;

        let report = handler(&f, 10)
            .handle(ReconcileDocumentsCommand { dry_run: true })
            .await
            .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.in_sync, 1);
        assert_eq!(report.divergent, 2);
        assert_eq!(report.missing, 1);
        assert_eq!(report.rewritten, 0);
        assert_eq!(report.divergent_user_ids, vec!["u2", "u3"]);
        assert_eq!(f.documents.write_count(), 0);
    }

    #[tokio::test]
    async fn divergent_documents_are_rewritten() {
        let f = fixture().await;

        let report = handler(&f, 10)
            .handle(ReconcileDocumentsCommand::default())
            .await
            .unwrap();

        assert_eq!(report.rewritten, 2);
        let u2 = f.documents.document("u2").await.unwrap();
        assert_eq!(u2.subscription.status, AccessStatus::Inactive);
        assert_eq!(u2.subscription.quota, 0);
        assert!(f.documents.document("u3").await.is_some());

        let second = handler(&f, 10)
            .handle(ReconcileDocumentsCommand::default())
            .await
            .unwrap();
        assert_eq!(second.in_sync, 3);
    }

    #[tokio::test]
    async fn pages_through_all_users() {
        let f = fixture().await;

        let report = handler(&f, 1)
            .handle(ReconcileDocumentsCommand { dry_run: true })
            .await
            .unwrap();

        assert_eq!(report.scanned, 3);
    }

    #[tokio::test]
    async fn write_failures_are_counted() {
        let f = fixture().await;
        f.documents.fail_next_writes(1);

        let report = handler(&f, 10)
            .handle(ReconcileDocumentsCommand::default())
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.rewritten, 1);
    }
}
