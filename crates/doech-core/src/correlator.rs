//! Request correlator.
//!
//! Classifies observations as primary or subordinate and binds each one to a
//! navigation group at observation time. Security info may arrive later;
//! until then the observation waits in a bounded pending set.
//!
//! Binding rule: a subordinate belongs to the group that was open for its tab
//! when its headers were observed. A reload observed afterwards does not move
//! it, however late its security info resolves.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MonitorConfig;
use crate::lifecycle::TabTracker;
use crate::store::GroupOpen;
use crate::types::{
    GroupId, Observation, RequestId, RequestKind, RequestRecord, SecurityInfo, SummaryPair, TabId,
    TabInstance,
};

/// Why an observation produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// `tabId == -1`: not tied to any tab.
    NoTab,
    /// Subordinate with no open navigation group for its tab.
    NoOpenGroup,
    /// Served from cache while cached responses are skipped.
    Cached,
    /// Security info did not resolve within the timeout.
    Unresolved,
    /// Pushed out by newer pending observations on the same tab.
    Evicted,
    /// Replaced by a later observation with the same request id.
    Superseded,
    /// The owning tab was removed before the record was finalized.
    TabRemoved,
}

/// Outcome of classifying one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationResult {
    Primary { group_id: GroupId },
    Subordinate { group_id: GroupId },
    Discarded { reason: DiscardReason },
}

/// A record that was finalized and committed to its tab.
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub record: RequestRecord,
    /// The owning tab's summaries after the commit.
    pub tab_summaries: SummaryPair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub result: CorrelationResult,
    /// Set when the observation carried complete security info.
    pub finalized: Option<Finalized>,
}

/// Outcome of a security-info resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Finalized(Finalized),
    /// Info merged but still incomplete.
    StillPending,
    /// The pending observation was dropped.
    Dropped(DiscardReason),
    /// No pending observation with this id (already final, expired or never seen).
    Unknown,
}

/// Diagnostic counters. Never surfaced as user-facing errors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub observed: u64,
    pub finalized: u64,
    pub discarded_no_tab: u64,
    pub discarded_no_open_group: u64,
    pub skipped_cached: u64,
    pub expired_unresolved: u64,
    pub evicted: u64,
    pub superseded: u64,
    pub dropped_tab_removed: u64,
    pub stale_primaries: u64,
    pub unknown_resolutions: u64,
}

impl Diagnostics {
    fn count_discard(&mut self, reason: DiscardReason) {
        let slot = match reason {
            DiscardReason::NoTab => &mut self.discarded_no_tab,
            DiscardReason::NoOpenGroup => &mut self.discarded_no_open_group,
            DiscardReason::Cached => &mut self.skipped_cached,
            DiscardReason::Unresolved => &mut self.expired_unresolved,
            DiscardReason::Evicted => &mut self.evicted,
            DiscardReason::Superseded => &mut self.superseded,
            DiscardReason::TabRemoved => &mut self.dropped_tab_removed,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone)]
struct Pending {
    observation: Observation,
    instance: TabInstance,
    group_id: GroupId,
    info: SecurityInfo,
    deadline: DateTime<Utc>,
}

pub struct Correlator {
    pending: HashMap<RequestId, Pending>,
    /// Pending request ids per tab, oldest first.
    order: HashMap<TabId, VecDeque<RequestId>>,
    timeout: Duration,
    max_pending_per_tab: usize,
    skip_cached: bool,
    diagnostics: Diagnostics,
}

impl Correlator {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            pending: HashMap::new(),
            order: HashMap::new(),
            timeout: Duration::milliseconds(
                i64::try_from(config.pending_timeout_ms).unwrap_or(i64::MAX),
            ),
            max_pending_per_tab: config.max_pending_per_tab.max(1),
            skip_cached: config.skip_cached,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Classify an observation, bind it to a group and either finalize it or
    /// park it until its security info resolves.
    pub fn classify_and_correlate(
        &mut self,
        tabs: &mut TabTracker,
        observation: Observation,
        now: DateTime<Utc>,
    ) -> Correlation {
        self.diagnostics.observed += 1;
        let tab_id = observation.tab_id;

        if tab_id.is_none() {
            return self.discard(&observation, DiscardReason::NoTab);
        }
        if self.skip_cached && observation.from_cache {
            return self.discard(&observation, DiscardReason::Cached);
        }

        let (instance, group_id, result) = match observation.kind() {
            RequestKind::Primary => {
                let group_id = observation.request_id.clone();
                let (instance, outcome) =
                    tabs.open_group(tab_id, group_id.clone(), observation.timestamp);
                match &outcome {
                    GroupOpen::Current { superseded } => debug!(
                        tab_id = %tab_id,
                        group_id = %group_id,
                        superseded = ?superseded,
                        "navigation group opened"
                    ),
                    GroupOpen::History => {
                        self.diagnostics.stale_primaries += 1;
                        debug!(
                            tab_id = %tab_id,
                            group_id = %group_id,
                            "stale primary kept as history"
                        );
                    }
                    GroupOpen::Existing => {
                        debug!(tab_id = %tab_id, group_id = %group_id, "primary re-observed")
                    }
                }
                let result = CorrelationResult::Primary {
                    group_id: group_id.clone(),
                };
                (instance, group_id, result)
            }
            RequestKind::Subordinate => match tabs.open_group_of(tab_id) {
                Some((instance, group_id)) => {
                    let result = CorrelationResult::Subordinate {
                        group_id: group_id.clone(),
                    };
                    (instance, group_id, result)
                }
                None => return self.discard(&observation, DiscardReason::NoOpenGroup),
            },
        };

        let info = observation.security_info.unwrap_or_default();
        if let Some((used_ech, used_private_dns)) = info.resolved() {
            let record = RequestRecord::finalize(observation, group_id, used_ech, used_private_dns);
            let finalized = self.commit(tabs, instance, record);
            return Correlation {
                result,
                finalized,
            };
        }

        self.park(Pending {
            observation,
            instance,
            group_id,
            info,
            deadline: now
                .checked_add_signed(self.timeout)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        });
        Correlation {
            result,
            finalized: None,
        }
    }

    /// Merge security info for a pending request and finalize it once both
    /// properties are known. The owning tab instance is re-checked first.
    pub fn resolve(
        &mut self,
        tabs: &mut TabTracker,
        request_id: &RequestId,
        info: SecurityInfo,
    ) -> Resolution {
        let Some(pending) = self.pending.get_mut(request_id) else {
            self.diagnostics.unknown_resolutions += 1;
            debug!(request_id = %request_id, "resolution for unknown request ignored");
            return Resolution::Unknown;
        };

        if !tabs.is_live(pending.instance) {
            let pending = self.unpark(request_id);
            if let Some(p) = pending {
                self.diagnostics.count_discard(DiscardReason::TabRemoved);
                debug!(
                    tab_id = %p.instance.tab_id,
                    request_id = %request_id,
                    "tab gone before resolution, dropped"
                );
            }
            return Resolution::Dropped(DiscardReason::TabRemoved);
        }

        if info.used_ech.is_some() {
            pending.info.used_ech = info.used_ech;
        }
        if info.used_private_dns.is_some() {
            pending.info.used_private_dns = info.used_private_dns;
        }
        let Some((used_ech, used_private_dns)) = pending.info.resolved() else {
            return Resolution::StillPending;
        };

        let Some(pending) = self.unpark(request_id) else {
            return Resolution::Unknown;
        };
        let record = RequestRecord::finalize(
            pending.observation,
            pending.group_id,
            used_ech,
            used_private_dns,
        );
        match self.commit(tabs, pending.instance, record) {
            Some(finalized) => Resolution::Finalized(finalized),
            None => Resolution::Dropped(DiscardReason::TabRemoved),
        }
    }

    /// Drop pending observations whose deadline has passed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if self.unpark(id).is_some() {
                self.diagnostics.count_discard(DiscardReason::Unresolved);
                debug!(request_id = %id, "security info never resolved, dropped");
            }
        }
        expired.len()
    }

    /// Forget every pending observation of a removed tab.
    pub fn forget_tab(&mut self, tab_id: TabId) -> usize {
        let Some(ids) = self.order.remove(&tab_id) else {
            return 0;
        };
        let mut dropped = 0;
        for id in ids {
            if self.pending.remove(&id).is_some() {
                self.diagnostics.count_discard(DiscardReason::TabRemoved);
                dropped += 1;
            }
        }
        dropped
    }

    fn park(&mut self, pending: Pending) {
        let tab_id = pending.instance.tab_id;
        let request_id = pending.observation.request_id.clone();

        if self.unpark(&request_id).is_some() {
            self.diagnostics.count_discard(DiscardReason::Superseded);
            debug!(request_id = %request_id, "pending observation superseded");
        }

        let queue = self.order.entry(tab_id).or_default();
        while queue.len() >= self.max_pending_per_tab {
            let Some(oldest) = queue.pop_front() else {
                break;
            };
            if self.pending.remove(&oldest).is_some() {
                self.diagnostics.count_discard(DiscardReason::Evicted);
                debug!(tab_id = %tab_id, request_id = %oldest, "pending observation evicted");
            }
        }
        queue.push_back(request_id.clone());
        self.pending.insert(request_id, pending);
    }

    fn unpark(&mut self, request_id: &RequestId) -> Option<Pending> {
        let pending = self.pending.remove(request_id)?;
        let tab_id = pending.instance.tab_id;
        if let Some(queue) = self.order.get_mut(&tab_id) {
            queue.retain(|id| id != request_id);
            if queue.is_empty() {
                self.order.remove(&tab_id);
            }
        }
        Some(pending)
    }

    fn commit(
        &mut self,
        tabs: &mut TabTracker,
        instance: TabInstance,
        record: RequestRecord,
    ) -> Option<Finalized> {
        let request_id = record.request_id.clone();
        match tabs.commit(instance, record.clone()) {
            Some(tab_summaries) => {
                self.diagnostics.finalized += 1;
                debug!(
                    tab_id = %instance.tab_id,
                    request_id = %request_id,
                    kind = %record.kind,
                    used_ech = record.used_ech,
                    used_private_dns = record.used_private_dns,
                    "record finalized"
                );
                Some(Finalized {
                    record,
                    tab_summaries,
                })
            }
            None => {
                self.diagnostics.count_discard(DiscardReason::TabRemoved);
                None
            }
        }
    }

    fn discard(&mut self, observation: &Observation, reason: DiscardReason) -> Correlation {
        self.diagnostics.count_discard(reason);
        debug!(
            tab_id = %observation.tab_id,
            request_id = %observation.request_id,
            reason = ?reason,
            "observation discarded"
        );
        Correlation {
            result: CorrelationResult::Discarded { reason },
            finalized: None,
        }
    }
}
