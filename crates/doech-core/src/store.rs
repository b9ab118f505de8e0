//! Tab state store: per-tab navigation groups, finalized records and counters.
//!
//! The store is an owned value with an explicit create/destroy lifecycle. Each
//! created tab gets a fresh generation so that a reused numeric tab id never
//! inherits writes meant for an earlier tab.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::aggregate::Aggregate;
use crate::types::{GroupId, RequestRecord, TabId, TabInstance};

/// A primary request and the subordinate requests correlated to it.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationGroup {
    pub id: GroupId,
    /// Timestamp of the primary observation that opened the group.
    pub opened_at: DateTime<Utc>,
    pub closed: bool,
    /// Latest finalized primary record. `None` while unresolved, or for good
    /// if its security info never arrived.
    pub primary: Option<RequestRecord>,
    pub subordinates: Vec<RequestRecord>,
}

impl NavigationGroup {
    fn new(id: GroupId, opened_at: DateTime<Utc>) -> Self {
        Self {
            id,
            opened_at,
            closed: false,
            primary: None,
            subordinates: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.primary.is_some()) + self.subordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a newly observed primary landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOpen {
    /// The group is now the tab's open group.
    Current { superseded: Option<GroupId> },
    /// Older than the open group; kept as closed history.
    History,
    /// Same id as an existing group (redirect hop); nothing new was opened.
    Existing,
}

#[derive(Debug, Clone)]
pub struct TabState {
    instance: TabInstance,
    /// Ordered oldest to newest by `opened_at`.
    groups: Vec<NavigationGroup>,
    open_group: Option<GroupId>,
    /// Finalized records in emission order.
    entries: Vec<RequestRecord>,
    aggregate: Aggregate,
    loading_since: Option<DateTime<Utc>>,
}

impl TabState {
    fn new(instance: TabInstance) -> Self {
        Self {
            instance,
            groups: Vec::new(),
            open_group: None,
            entries: Vec::new(),
            aggregate: Aggregate::new(),
            loading_since: None,
        }
    }

    pub fn instance(&self) -> TabInstance {
        self.instance
    }

    pub fn groups(&self) -> &[NavigationGroup] {
        &self.groups
    }

    pub fn group(&self, id: &GroupId) -> Option<&NavigationGroup> {
        self.groups.iter().find(|g| &g.id == id)
    }

    pub fn open_group_id(&self) -> Option<&GroupId> {
        self.open_group.as_ref()
    }

    pub fn entries(&self) -> &[RequestRecord] {
        &self.entries
    }

    pub fn aggregate(&self) -> &Aggregate {
        &self.aggregate
    }

    pub fn loading_since(&self) -> Option<DateTime<Utc>> {
        self.loading_since
    }

    pub fn mark_loading(&mut self, at: DateTime<Utc>) {
        self.loading_since = Some(at);
    }

    /// Open a navigation group for a newly observed primary request.
    pub fn open_group(&mut self, id: GroupId, opened_at: DateTime<Utc>) -> GroupOpen {
        if self.group(&id).is_some() {
            return GroupOpen::Existing;
        }

        let current_opened_at = self
            .open_group
            .as_ref()
            .and_then(|open| self.group(open))
            .map(|g| g.opened_at);

        if let Some(current) = current_opened_at {
            if opened_at < current {
                let mut group = NavigationGroup::new(id, opened_at);
                group.closed = true;
                let pos = self.groups.partition_point(|g| g.opened_at <= opened_at);
                self.groups.insert(pos, group);
                return GroupOpen::History;
            }
        }

        let superseded = self.open_group.take();
        if let Some(prev) = &superseded {
            if let Some(g) = self.groups.iter_mut().find(|g| &g.id == prev) {
                g.closed = true;
            }
        }
        self.groups.push(NavigationGroup::new(id.clone(), opened_at));
        self.open_group = Some(id);
        GroupOpen::Current { superseded }
    }

    /// Append a finalized record to its group, the entry list and the tab
    /// counters in one step. Returns `false` if the group is unknown.
    pub fn commit(&mut self, record: RequestRecord) -> bool {
        let Some(group) = self.groups.iter_mut().find(|g| g.id == record.group_id) else {
            return false;
        };
        if record.is_primary() {
            group.primary = Some(record.clone());
        } else {
            group.subordinates.push(record.clone());
        }
        self.aggregate.record(&record);
        self.entries.push(record);
        true
    }
}

/// Owner of all per-tab state.
#[derive(Debug, Default)]
pub struct TabStore {
    tabs: HashMap<TabId, TabState>,
    next_generation: u64,
}

impl TabStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the tab's state, creating an empty one if absent.
    pub fn create(&mut self, tab_id: TabId) -> &mut TabState {
        let next_generation = &mut self.next_generation;
        self.tabs.entry(tab_id).or_insert_with(|| {
            let instance = TabInstance {
                tab_id,
                generation: *next_generation,
            };
            *next_generation += 1;
            TabState::new(instance)
        })
    }

    /// Remove the tab and everything it holds.
    pub fn destroy(&mut self, tab_id: TabId) -> Option<TabState> {
        self.tabs.remove(&tab_id)
    }

    pub fn get(&self, tab_id: TabId) -> Option<&TabState> {
        self.tabs.get(&tab_id)
    }

    /// State for exactly this tab instance, if it is still alive.
    pub fn live_mut(&mut self, instance: TabInstance) -> Option<&mut TabState> {
        self.tabs
            .get_mut(&instance.tab_id)
            .filter(|state| state.instance == instance)
    }

    pub fn is_live(&self, instance: TabInstance) -> bool {
        self.tabs
            .get(&instance.tab_id)
            .is_some_and(|state| state.instance == instance)
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}
