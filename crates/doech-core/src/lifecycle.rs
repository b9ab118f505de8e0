//! Tab lifecycle tracker.
//!
//! Owns the [`TabStore`] and reacts to activation, removal and update
//! signals. The correlator reaches tab state only through the accessors here.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::protocol::{TabSnapshot, TabStatus};
use crate::store::{GroupOpen, TabStore};
use crate::types::{GroupId, RequestRecord, Summary, SummaryPair, TabId, TabInstance};

#[derive(Debug, Default)]
pub struct TabTracker {
    store: TabStore,
    active: Option<TabId>,
}

impl TabTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: TabStore) -> Self {
        Self {
            store,
            active: None,
        }
    }

    pub fn store(&self) -> &TabStore {
        &self.store
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.active
    }

    /// The tab gained focus. Creates empty state if needed and returns the
    /// snapshot the sink should render.
    pub fn tab_activated(&mut self, tab_id: TabId) -> TabSnapshot {
        if tab_id.is_none() {
            return TabSnapshot::empty(tab_id);
        }
        self.store.create(tab_id);
        self.active = Some(tab_id);
        debug!(tab_id = %tab_id, "tab activated");
        self.snapshot(tab_id)
    }

    /// Drop every piece of state for the tab. Returns the released instance.
    pub fn tab_removed(&mut self, tab_id: TabId) -> Option<TabInstance> {
        if tab_id.is_none() {
            return None;
        }
        if self.active == Some(tab_id) {
            self.active = None;
        }
        let removed = self.store.destroy(tab_id)?;
        info!(
            tab_id = %tab_id,
            entries = removed.entries().len(),
            groups = removed.groups().len(),
            "tab removed"
        );
        Some(removed.instance())
    }

    /// Status change. `loading` marks a navigation start; the request
    /// handler is stateless and takes the tab id per event, so there is
    /// nothing to rebind here.
    pub fn tab_updated(&mut self, tab_id: TabId, status: TabStatus, now: DateTime<Utc>) {
        if tab_id.is_none() {
            return;
        }
        if status == TabStatus::Loading {
            self.store.create(tab_id).mark_loading(now);
            debug!(tab_id = %tab_id, "navigation started");
        }
    }

    /// Finalized records of the tab, oldest first. Empty for unknown tabs.
    pub fn get_entries(&self, tab_id: TabId) -> &[RequestRecord] {
        self.store
            .get(tab_id)
            .map(|s| s.entries())
            .unwrap_or_default()
    }

    pub fn summarize(&self, tab_id: TabId, include_subordinate: bool) -> Summary {
        self.store
            .get(tab_id)
            .map(|s| s.aggregate().summarize(include_subordinate))
            .unwrap_or_default()
    }

    pub fn summaries(&self, tab_id: TabId) -> SummaryPair {
        self.store
            .get(tab_id)
            .map(|s| s.aggregate().summaries())
            .unwrap_or_default()
    }

    pub fn snapshot(&self, tab_id: TabId) -> TabSnapshot {
        match self.store.get(tab_id) {
            Some(state) => TabSnapshot {
                tab_id,
                entries: state.entries().to_vec(),
                summaries: state.aggregate().summaries(),
            },
            None => TabSnapshot::empty(tab_id),
        }
    }

    // --- correlator accessors ---

    /// Open a group for a primary observation, creating the tab if needed.
    pub(crate) fn open_group(
        &mut self,
        tab_id: TabId,
        group_id: GroupId,
        opened_at: DateTime<Utc>,
    ) -> (TabInstance, GroupOpen) {
        let state = self.store.create(tab_id);
        let outcome = state.open_group(group_id, opened_at);
        (state.instance(), outcome)
    }

    /// The tab's currently open group, if any.
    pub(crate) fn open_group_of(&self, tab_id: TabId) -> Option<(TabInstance, GroupId)> {
        let state = self.store.get(tab_id)?;
        let group = state.open_group_id()?.clone();
        Some((state.instance(), group))
    }

    pub(crate) fn is_live(&self, instance: TabInstance) -> bool {
        self.store.is_live(instance)
    }

    /// Commit a finalized record into exactly this tab instance. Returns the
    /// tab's refreshed summaries, or `None` if the instance is gone.
    pub(crate) fn commit(
        &mut self,
        instance: TabInstance,
        record: RequestRecord,
    ) -> Option<SummaryPair> {
        let state = self.store.live_mut(instance)?;
        if !state.commit(record) {
            return None;
        }
        Some(state.aggregate().summaries())
    }
}
