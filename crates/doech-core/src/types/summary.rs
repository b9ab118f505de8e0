use serde::{Deserialize, Serialize};

/// Which records a summary or export covers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Primary (top-level document) requests only.
    PrimaryOnly,
    /// Primary and subordinate requests.
    #[default]
    All,
}

impl Scope {
    pub fn include_subordinate(self) -> bool {
        self == Self::All
    }

    pub fn from_include_subordinate(include_subordinate: bool) -> Self {
        if include_subordinate {
            Self::All
        } else {
            Self::PrimaryOnly
        }
    }
}

/// Percentage view over a set of counters, computed on read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: u64,
    pub ech_percent: f64,
    pub private_dns_percent: f64,
}

/// Both granularities at once, as the sidebar renders them side by side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPair {
    pub primary: Summary,
    pub all: Summary,
}
