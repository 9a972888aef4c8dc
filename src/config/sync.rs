//! Synchronizer tuning: plan catalog, projection relay, reconciliation

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// YAML plan catalog replacing the built-in price table
    pub plan_catalog_path: Option<PathBuf>,

    /// How often the relay polls the projection outbox, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub relay_poll_interval_ms: u64,

    /// Entries projected per poll
    #[serde(default = "default_batch_size")]
    pub relay_batch_size: i64,

    /// Failures after which each further failure is logged at error level.
    /// Entries keep being retried regardless.
    #[serde(default = "default_alert_after_attempts")]
    pub relay_alert_after_attempts: i32,

    /// Ceiling on the exponential retry delay of a failing entry, in seconds
    #[serde(default = "default_max_backoff")]
    pub relay_max_backoff_secs: u64,

    /// Published outbox entries are deleted after this many days
    #[serde(default = "default_outbox_retention")]
    pub outbox_retention_days: i64,

    /// Ledger rows are deleted after this many days
    #[serde(default = "default_ledger_retention")]
    pub ledger_retention_days: i64,

    /// Parallel document comparisons during reconciliation
    #[serde(default = "default_reconcile_concurrency")]
    pub reconcile_concurrency: usize,

    /// Users fetched per page during reconciliation
    #[serde(default = "default_reconcile_page_size")]
    pub reconcile_page_size: i64,
}

impl SyncConfig {
    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_poll_interval_ms)
    }

    pub fn relay_max_backoff(&self) -> Duration {
        Duration::from_secs(self.relay_max_backoff_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.relay_poll_interval_ms < 50 {
            return Err(ValidationError::InvalidSyncSetting("relay_poll_interval_ms"));
        }
        if !(1..=1000).contains(&self.relay_batch_size) {
            return Err(ValidationError::InvalidSyncSetting("relay_batch_size"));
        }
        if self.relay_alert_after_attempts < 1 {
            return Err(ValidationError::InvalidSyncSetting("relay_alert_after_attempts"));
        }
        if self.relay_max_backoff() < self.relay_poll_interval()
            || self.relay_max_backoff_secs > 3600
        {
            return Err(ValidationError::InvalidSyncSetting("relay_max_backoff_secs"));
        }
        if self.outbox_retention_days < 1 || self.ledger_retention_days < 1 {
            return Err(ValidationError::InvalidSyncSetting("retention_days"));
        }
        if !(1..=64).contains(&self.reconcile_concurrency) {
            return Err(ValidationError::InvalidSyncSetting("reconcile_concurrency"));
        }
        if !(1..=1000).contains(&self.reconcile_page_size) {
            return Err(ValidationError::InvalidSyncSetting("reconcile_page_size"));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            plan_catalog_path: None,
            relay_poll_interval_ms: default_poll_interval(),
            relay_batch_size: default_batch_size(),
            relay_alert_after_attempts: default_alert_after_attempts(),
            relay_max_backoff_secs: default_max_backoff(),
            outbox_retention_days: default_outbox_retention(),
            ledger_retention_days: default_ledger_retention(),
            reconcile_concurrency: default_reconcile_concurrency(),
            reconcile_page_size: default_reconcile_page_size(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_batch_size() -> i64 {
    50
}

fn default_alert_after_attempts() -> i32 {
    10
}

fn default_max_backoff() -> u64 {
    300
}

fn default_outbox_retention() -> i64 {
    7
}

fn default_ledger_retention() -> i64 {
    90
}

fn default_reconcile_concurrency() -> usize {
    8
}

fn default_reconcile_page_size() -> i64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.relay_poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = SyncConfig {
            relay_batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidSyncSetting("relay_batch_size"))
        ));
    }

    #[test]
    fn test_backoff_ceiling_below_poll_interval_rejected() {
        let config = SyncConfig {
            relay_poll_interval_ms: 5000,
            relay_max_backoff_secs: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidSyncSetting("relay_max_backoff_secs"))
        ));
    }

    #[test]
    fn test_unbounded_concurrency_rejected() {
        let config = SyncConfig {
            reconcile_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
