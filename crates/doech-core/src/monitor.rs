//! Pure, synchronous monitor: one event in, zero or more sink messages out.
//!
//! Each call is one step of the single logical event loop. Committing a
//! record, appending it to the export log and producing its `entry-added`
//! message happen inside the same call.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::MonitorConfig;
use crate::correlator::{Correlation, Correlator, Diagnostics, Finalized, Resolution};
use crate::error::CoreError;
use crate::export::{ExportDocument, ExportLog};
use crate::lifecycle::TabTracker;
use crate::protocol::{EntryAdded, HostEvent, SinkMessage, SinkRequest, TabSnapshot};
use crate::store::TabStore;
use crate::types::{
    Observation, RequestId, RequestRecord, Scope, SecurityInfo, Summary, SummaryPair, TabId,
};

pub struct Monitor {
    config: MonitorConfig,
    tracker: TabTracker,
    correlator: Correlator,
    export: ExportLog,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self::with_tracker(config, TabTracker::with_store(TabStore::new())))
    }

    /// Build around an injected tracker. The config is assumed valid.
    pub fn with_tracker(config: MonitorConfig, tracker: TabTracker) -> Self {
        let correlator = Correlator::new(&config);
        Self {
            config,
            tracker,
            correlator,
            export: ExportLog::new(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &TabTracker {
        &self.tracker
    }

    /// Apply one host event.
    pub fn handle(&mut self, event: HostEvent, now: DateTime<Utc>) -> Vec<SinkMessage> {
        match event {
            HostEvent::HeadersReceived(observation) => {
                let correlation = self.observe(observation, now);
                correlation
                    .finalized
                    .map(|f| vec![entry_added(f)])
                    .unwrap_or_default()
            }
            HostEvent::SecurityInfo(resolved) => {
                match self.resolve(&resolved.request_id, resolved.info) {
                    Resolution::Finalized(f) => vec![entry_added(f)],
                    _ => Vec::new(),
                }
            }
            HostEvent::TabActivated(tab) => {
                vec![SinkMessage::Snapshot(self.tracker.tab_activated(tab.tab_id))]
            }
            HostEvent::TabRemoved(tab) => {
                self.tab_removed(tab.tab_id);
                Vec::new()
            }
            HostEvent::TabUpdated(update) => {
                self.tracker.tab_updated(update.tab_id, update.status, now);
                Vec::new()
            }
        }
    }

    /// Answer a sink request.
    pub fn handle_request(&self, request: SinkRequest, now: DateTime<Utc>) -> SinkMessage {
        match request {
            SinkRequest::RefreshRequest(tab) => SinkMessage::Snapshot(self.snapshot(tab.tab_id)),
            SinkRequest::Export(req) => SinkMessage::Export(self.export(req.scope, now)),
        }
    }

    /// Classify and correlate an observation without producing messages.
    /// Finalized records are still committed and logged for export.
    pub fn observe(&mut self, observation: Observation, now: DateTime<Utc>) -> Correlation {
        let correlation =
            self.correlator
                .classify_and_correlate(&mut self.tracker, observation, now);
        if let Some(finalized) = &correlation.finalized {
            self.export.push(finalized.record.clone());
        }
        correlation
    }

    fn resolve(&mut self, request_id: &RequestId, info: SecurityInfo) -> Resolution {
        let resolution = self.correlator.resolve(&mut self.tracker, request_id, info);
        if let Resolution::Finalized(finalized) = &resolution {
            self.export.push(finalized.record.clone());
        }
        resolution
    }

    fn tab_removed(&mut self, tab_id: TabId) {
        let released = self.tracker.tab_removed(tab_id);
        let dropped = self.correlator.forget_tab(tab_id);
        if released.is_some() || dropped > 0 {
            debug!(tab_id = %tab_id, dropped_pending = dropped, "tab state released");
        }
    }

    /// Expire pending observations past their deadline.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        self.correlator.sweep(now)
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.correlator.is_pending(request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }

    pub fn entries(&self, tab_id: TabId) -> &[RequestRecord] {
        self.tracker.get_entries(tab_id)
    }

    pub fn summarize(&self, tab_id: TabId, include_subordinate: bool) -> Summary {
        self.tracker.summarize(tab_id, include_subordinate)
    }

    pub fn summaries(&self, tab_id: TabId) -> SummaryPair {
        self.tracker.summaries(tab_id)
    }

    /// Summary over every record finalized during the process lifetime.
    pub fn global_summary(&self, include_subordinate: bool) -> Summary {
        self.export.aggregate().summarize(include_subordinate)
    }

    pub fn snapshot(&self, tab_id: TabId) -> TabSnapshot {
        self.tracker.snapshot(tab_id)
    }

    pub fn export(&self, scope: Scope, now: DateTime<Utc>) -> ExportDocument {
        self.export.document(scope, now)
    }

    pub fn export_log(&self) -> &ExportLog {
        &self.export
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.correlator.diagnostics()
    }
}

fn entry_added(finalized: Finalized) -> SinkMessage {
    SinkMessage::EntryAdded(EntryAdded {
        tab_id: finalized.record.tab_id,
        record: finalized.record,
        summaries: finalized.tab_summaries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{SecurityResolved, TabRef, TabStatus, TabUpdate};
    use crate::types::ResourceType;
    use chrono::Duration;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .expect("valid")
            .with_timezone(&Utc)
    }

    fn headers(tab: i64, id: &str, rt: ResourceType, info: Option<(bool, bool)>) -> HostEvent {
        HostEvent::HeadersReceived(Observation {
            tab_id: TabId(tab),
            request_id: RequestId::new(id),
            url: format!("https://site.test/{id}"),
            timestamp: t0(),
            ip: None,
            status_code: 200,
            from_cache: false,
            resource_type: rt,
            security_info: info.map(|(e, d)| SecurityInfo::known(e, d)),
        })
    }

    fn security(id: &str, ech: bool, dns: bool) -> HostEvent {
        HostEvent::SecurityInfo(SecurityResolved {
            request_id: RequestId::new(id),
            info: SecurityInfo::known(ech, dns),
        })
    }

    fn monitor() -> Monitor {
        Monitor::new(MonitorConfig::default()).expect("valid config")
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = MonitorConfig {
            pending_timeout_ms: 0,
            ..MonitorConfig::default()
        };
        assert!(matches!(
            Monitor::new(cfg),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn primary_and_subordinate_scenario() {
        let mut m = monitor();
        m.handle(headers(1, "A", ResourceType::MainFrame, None), t0());
        m.handle(headers(1, "B", ResourceType::Image, None), t0());
        let a = m.handle(security("A", true, false), t0());
        let b = m.handle(security("B", true, true), t0());
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);

        let primary = m.summarize(TabId(1), false);
        assert_eq!(primary.total, 1);
        assert_eq!(primary.ech_percent, 100.0);
        assert_eq!(primary.private_dns_percent, 0.0);

        let all = m.summarize(TabId(1), true);
        assert_eq!(all.total, 2);
        assert_eq!(all.ech_percent, 100.0);
        assert_eq!(all.private_dns_percent, 50.0);

        match &b[0] {
            SinkMessage::EntryAdded(entry) => {
                assert_eq!(entry.tab_id, TabId(1));
                assert_eq!(entry.record.request_id, RequestId::new("B"));
                assert_eq!(entry.summaries.all, all);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn activation_pushes_snapshot() {
        let mut m = monitor();
        m.handle(headers(4, "A", ResourceType::MainFrame, Some((true, true))), t0());
        let out = m.handle(HostEvent::TabActivated(TabRef { tab_id: TabId(4) }), t0());
        match out.as_slice() {
            [SinkMessage::Snapshot(snap)] => {
                assert_eq!(snap.tab_id, TabId(4));
                assert_eq!(snap.entries.len(), 1);
            }
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[test]
    fn removal_keeps_export_history() {
        let mut m = monitor();
        m.handle(headers(2, "A", ResourceType::MainFrame, Some((true, false))), t0());
        m.handle(headers(2, "B", ResourceType::Script, None), t0());
        m.handle(HostEvent::TabRemoved(TabRef { tab_id: TabId(2) }), t0());

        assert!(m.entries(TabId(2)).is_empty());
        assert_eq!(m.summarize(TabId(2), true), Summary::default());
        assert_eq!(m.pending_count(), 0);
        assert!(m.handle(security("B", true, true), t0()).is_empty());

        assert_eq!(m.global_summary(true).total, 1);
        assert_eq!(m.export(Scope::All, t0()).entries.len(), 1);

        // Fresh tab with the same id starts empty.
        m.handle(HostEvent::TabActivated(TabRef { tab_id: TabId(2) }), t0());
        assert!(m.entries(TabId(2)).is_empty());
    }

    #[test]
    fn loading_update_creates_state_without_messages() {
        let mut m = monitor();
        let out = m.handle(
            HostEvent::TabUpdated(TabUpdate {
                tab_id: TabId(8),
                status: TabStatus::Loading,
            }),
            t0(),
        );
        assert!(out.is_empty());
        assert!(m.tracker().store().contains(TabId(8)));
    }

    #[test]
    fn sink_requests_are_answered() {
        let mut m = monitor();
        m.handle(headers(1, "A", ResourceType::MainFrame, Some((true, true))), t0());
        m.handle(headers(1, "B", ResourceType::Image, Some((false, true))), t0());

        let refresh = m.handle_request(
            SinkRequest::decode(r#"{"type":"refresh-request","data":{"tabId":1}}"#)
                .expect("decode"),
            t0(),
        );
        assert!(matches!(refresh, SinkMessage::Snapshot(ref s) if s.entries.len() == 2));

        let export = m.handle_request(
            SinkRequest::decode(r#"{"type":"export","data":{"scope":"primary-only"}}"#)
                .expect("decode"),
            t0(),
        );
        match export {
            SinkMessage::Export(doc) => {
                assert_eq!(doc.scope, Scope::PrimaryOnly);
                assert_eq!(doc.entries.len(), 1);
                assert_eq!(doc.summary.ech_percent, 100.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn sweep_drops_unresolved_without_output() {
        let mut m = monitor();
        m.handle(headers(1, "A", ResourceType::MainFrame, None), t0());
        assert!(m.is_pending(&RequestId::new("A")));
        assert_eq!(m.sweep(t0() + Duration::seconds(31)), 1);
        assert!(m.handle(security("A", true, true), t0()).is_empty());
        assert_eq!(m.diagnostics().expired_unresolved, 1);
        assert!(m.export_log().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Primary(i64),
        Subordinate(i64),
        Resolve(usize, bool, bool),
        Remove(i64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0i64..3).prop_map(Step::Primary),
            (-1i64..3).prop_map(Step::Subordinate),
            (0usize..64, any::<bool>(), any::<bool>()).prop_map(|(i, e, d)| Step::Resolve(i, e, d)),
            (0i64..3).prop_map(Step::Remove),
        ]
    }

    proptest! {
        #[test]
        fn global_total_matches_finalized_count(steps in prop::collection::vec(step(), 0..80)) {
            let mut m = monitor();
            let mut seen = Vec::new();
            let mut emitted = 0u64;
            for (n, s) in steps.into_iter().enumerate() {
                let id = format!("r{n}");
                let out = match s {
                    Step::Primary(tab) => {
                        seen.push(id.clone());
                        m.handle(headers(tab, &id, ResourceType::MainFrame, None), t0())
                    }
                    Step::Subordinate(tab) => {
                        seen.push(id.clone());
                        m.handle(headers(tab, &id, ResourceType::Image, None), t0())
                    }
                    Step::Resolve(i, e, d) => match seen.get(i) {
                        Some(target) => m.handle(security(target, e, d), t0()),
                        None => Vec::new(),
                    },
                    Step::Remove(tab) => {
                        m.handle(HostEvent::TabRemoved(TabRef { tab_id: TabId(tab) }), t0())
                    }
                };
                emitted += out.len() as u64;
            }

            prop_assert_eq!(m.global_summary(true).total, emitted);
            prop_assert_eq!(m.export_log().len() as u64, emitted);
            prop_assert_eq!(m.diagnostics().finalized, emitted);
            let s = m.global_summary(true);
            prop_assert!((0.0..=100.0).contains(&s.ech_percent));
            prop_assert!((0.0..=100.0).contains(&s.private_dns_percent));

            for tab in m.tracker().store().tab_ids() {
                prop_assert_eq!(
                    m.summarize(tab, true).total,
                    m.entries(tab).len() as u64
                );
            }
        }
    }
}
