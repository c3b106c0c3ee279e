use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid plan: {0:?}")]
    InvalidPlan(String),

    #[error("invalid plans file: {0}")]
    Config(String),
}

/// The fixed set of tiers the bot can sell. Which of them are on offer (and
/// at what price) is decided by the [`PlanCatalog`] of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Bronze,
    Silver,
    Gold,
}

impl PlanId {
    pub const ALL: [PlanId; 3] = [PlanId::Bronze, PlanId::Silver, PlanId::Gold];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Bronze => "bronze",
            PlanId::Silver => "silver",
            PlanId::Gold => "gold",
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        PlanId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| CatalogError::InvalidPlan(s.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    /// Price in the smallest currency unit (paise).
    pub price: i64,
    pub duration: Duration,
}

impl Plan {
    pub fn new(id: PlanId, name: impl Into<String>, price: i64, duration_days: i64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            duration: Duration::days(duration_days),
        }
    }

    pub fn duration_days(&self) -> i64 {
        self.duration.num_days()
    }

    pub fn price_display(&self) -> String {
        format_amount(self.price)
    }
}

/// Formats an amount given in paise, e.g. `19900` -> `₹199`, `19950` -> `₹199.50`.
pub fn format_amount(amount: i64) -> String {
    let rupees = amount / 100;
    let paise = (amount % 100).abs();
    if paise == 0 {
        format!("₹{}", rupees)
    } else {
        format!("₹{}.{:02}", rupees, paise)
    }
}

#[derive(Debug, Deserialize)]
struct PlansFile {
    plans: Vec<PlanEntry>,
}

#[derive(Debug, Deserialize)]
struct PlanEntry {
    id: PlanId,
    name: String,
    price: i64,
    duration_days: i64,
}

/// Immutable plan lookup table, ordered by price.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub fn new(mut plans: Vec<Plan>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for plan in &plans {
            if !seen.insert(plan.id) {
                return Err(CatalogError::Config(format!("duplicate plan {}", plan.id)));
            }
            if plan.price <= 0 {
                return Err(CatalogError::Config(format!(
                    "plan {} must have a positive price",
                    plan.id
                )));
            }
            if plan.duration <= Duration::zero() {
                return Err(CatalogError::Config(format!(
                    "plan {} must have a positive duration",
                    plan.id
                )));
            }
        }
        plans.sort_by_key(|p| (p.price, p.id));
        Ok(Self { plans })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, CatalogError> {
        let file: PlansFile =
            toml::from_str(contents).map_err(|e| CatalogError::Config(e.to_string()))?;
        let plans = file
            .plans
            .into_iter()
            .map(|e| Plan::new(e.id, e.name, e.price, e.duration_days))
            .collect();
        Self::new(plans)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Resolves a user-supplied identifier. Surrounding whitespace and case are
    /// ignored; anything outside the offered set is `InvalidPlan`, never a fallback.
    pub fn lookup(&self, raw: &str) -> Result<&Plan, CatalogError> {
        let id: PlanId = raw.parse()?;
        self.get(id)
            .ok_or_else(|| CatalogError::InvalidPlan(raw.trim().to_string()))
    }

    /// Returns `None` for a tier this deployment no longer offers.
    pub fn get(&self, id: PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == id)
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            plans: vec![
                Plan::new(PlanId::Bronze, "Bronze", 19_900, 30),
                Plan::new(PlanId::Silver, "Silver", 49_900, 90),
                Plan::new(PlanId::Gold, "Gold", 149_900, 365),
            ],
        }
    }
}
