use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "plan_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Professional,
    Growth,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Professional => "professional",
            PlanTier::Growth => "growth",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "professional" => Ok(PlanTier::Professional),
            "growth" => Ok(PlanTier::Growth),
            "enterprise" => Ok(PlanTier::Enterprise),
            other => Err(format!("unknown plan tier: {other}")),
        }
    }
}
