//! Plan resolution: Stripe price id to plan tier and meeting quota.
//!
//! Resolution is a pure lookup. An unknown price id is an error; the
//! synchronizer never guesses a tier.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Starter,
    Professional,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Starter => "starter",
            PlanTier::Professional => "professional",
            PlanTier::Enterprise => "enterprise",
        }
    }

    /// Parses the stored lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starter" => Some(PlanTier::Starter),
            "professional" => Some(PlanTier::Professional),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the price table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub price_id: String,
    pub tier: PlanTier,
    /// Meetings per billing period.
    pub quota: i32,
}

/// Errors from plan resolution and catalog loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("unknown price id '{0}'")]
    UnknownPrice(String),

    #[error("subscription has no price")]
    MissingPrice,

    #[error("price id '{0}' listed more than once")]
    DuplicatePrice(String),

    #[error("invalid plan catalog: {0}")]
    InvalidCatalog(String),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    plans: Vec<PlanEntry>,
}

/// Price table used by the Plan Resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    entries: HashMap<String, PlanEntry>,
}

static DEFAULT_CATALOG: Lazy<PlanCatalog> = Lazy::new(|| {
    let rows = [
        ("price_starter_monthly", PlanTier::Starter, 3),
        ("price_starter_yearly", PlanTier::Starter, 3),
        ("price_professional_monthly", PlanTier::Professional, 8),
        ("price_professional_yearly", PlanTier::Professional, 8),
        ("price_enterprise_monthly", PlanTier::Enterprise, 25),
        ("price_enterprise_yearly", PlanTier::Enterprise, 25),
    ];
    let entries = rows
        .into_iter()
        .map(|(price_id, tier, quota)| {
            (
                price_id.to_string(),
                PlanEntry {
                    price_id: price_id.to_string(),
                    tier,
                    quota,
                },
            )
        })
        .collect();
    PlanCatalog { entries }
});

impl PlanCatalog {
    /// Builds a catalog, rejecting duplicate price ids and negative quotas.
    pub fn from_entries(entries: impl IntoIterator<Item = PlanEntry>) -> Result<Self, PlanError> {
        let mut map = HashMap::new();
        for entry in entries {
            if entry.price_id.trim().is_empty() {
                return Err(PlanError::InvalidCatalog("empty price id".to_string()));
            }
            if entry.quota < 0 {
                return Err(PlanError::InvalidCatalog(format!(
                    "negative quota for '{}'",
                    entry.price_id
                )));
            }
            if map.contains_key(&entry.price_id) {
                return Err(PlanError::DuplicatePrice(entry.price_id));
            }
            map.insert(entry.price_id.clone(), entry);
        }
        if map.is_empty() {
            return Err(PlanError::InvalidCatalog("no plans defined".to_string()));
        }
        Ok(Self { entries: map })
    }

    /// Parses a YAML document of the form `plans: [{price_id, tier, quota}]`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PlanError> {
        let file: CatalogFile =
            serde_yaml::from_str(yaml).map_err(|e| PlanError::InvalidCatalog(e.to_string()))?;
        Self::from_entries(file.plans)
    }

    /// Loads a YAML catalog from disk.
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            PlanError::InvalidCatalog(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Resolves a price id. Unknown ids fail loudly.
    pub fn resolve(&self, price_id: &str) -> Result<&PlanEntry, PlanError> {
        self.entries
            .get(price_id)
            .ok_or_else(|| PlanError::UnknownPrice(price_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        DEFAULT_CATALOG.clone()
    }
}
