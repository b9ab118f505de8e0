//! Incremental ECH / private DNS counters.
//!
//! Sums are exact integers updated in O(1) per record; percentages are derived
//! on read so they can never go stale.

use serde::{Deserialize, Serialize};

use crate::types::{RequestRecord, Scope, Summary, SummaryPair};

/// Running sums for one granularity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub total: u64,
    pub ech: u64,
    pub private_dns: u64,
}

impl Counters {
    pub fn add(&mut self, used_ech: bool, used_private_dns: bool) {
        self.total += 1;
        self.ech += u64::from(used_ech);
        self.private_dns += u64::from(used_private_dns);
    }

    pub fn summary(&self) -> Summary {
        Summary {
            total: self.total,
            ech_percent: percent(self.ech, self.total),
            private_dns_percent: percent(self.private_dns, self.total),
        }
    }
}

/// `count / total` as a percentage with two-decimal precision.
/// An empty set is 0%, never NaN.
pub fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 * 100.0 / total as f64;
    (raw * 100.0).round() / 100.0
}

/// Primary-only and all-request counters kept side by side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    primary: Counters,
    all: Counters,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: &RequestRecord) {
        if record.is_primary() {
            self.primary.add(record.used_ech, record.used_private_dns);
        }
        self.all.add(record.used_ech, record.used_private_dns);
    }

    pub fn counters(&self, scope: Scope) -> Counters {
        match scope {
            Scope::PrimaryOnly => self.primary,
            Scope::All => self.all,
        }
    }

    pub fn summarize(&self, include_subordinate: bool) -> Summary {
        self.counters(Scope::from_include_subordinate(include_subordinate))
            .summary()
    }

    pub fn summaries(&self) -> SummaryPair {
        SummaryPair {
            primary: self.primary.summary(),
            all: self.all.summary(),
        }
    }
}
