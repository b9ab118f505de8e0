//! Process-lifetime export log and the JSON export document.
//!
//! The log keeps every finalized record in emission order, independent of
//! tab removal, together with global counters that always match it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::error::CoreError;
use crate::types::{RequestRecord, Scope, Summary};

#[derive(Debug, Default, Clone)]
pub struct ExportLog {
    records: Vec<RequestRecord>,
    aggregate: Aggregate,
}

impl ExportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: RequestRecord) {
        self.aggregate.record(&record);
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn aggregate(&self) -> &Aggregate {
        &self.aggregate
    }

    /// Records selected by `scope`, in emission order.
    pub fn filtered(&self, scope: Scope) -> impl Iterator<Item = &RequestRecord> {
        self.records
            .iter()
            .filter(move |r| scope.include_subordinate() || r.is_primary())
    }

    pub fn document(&self, scope: Scope, generated_at: DateTime<Utc>) -> ExportDocument {
        ExportDocument {
            generated_at,
            scope,
            summary: self.aggregate.counters(scope).summary(),
            entries: self.filtered(scope).cloned().collect(),
        }
    }
}

/// Serializable export. Timestamps are ISO-8601 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub generated_at: DateTime<Utc>,
    pub scope: Scope,
    pub summary: Summary,
    pub entries: Vec<RequestRecord>,
}

impl ExportDocument {
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string_pretty(self).map_err(CoreError::Export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequestId, RequestKind, ResourceType, TabId};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid")
            .with_timezone(&Utc)
    }

    fn record(id: &str, kind: RequestKind, used_ech: bool) -> RequestRecord {
        RequestRecord {
            tab_id: TabId(1),
            request_id: RequestId::new(id),
            group_id: RequestId::new("p"),
            kind,
            resource_type: if kind == RequestKind::Primary {
                ResourceType::MainFrame
            } else {
                ResourceType::Image
            },
            url: format!("https://a.test/{id}"),
            timestamp: ts("2025-03-01T10:00:00.250Z"),
            ip: Some("192.0.2.1".into()),
            status_code: 200,
            from_cache: false,
            used_ech,
            used_private_dns: true,
        }
    }

    #[test]
    fn primary_only_filters_subordinates() {
        let mut log = ExportLog::new();
        log.push(record("p", RequestKind::Primary, true));
        log.push(record("s1", RequestKind::Subordinate, false));
        log.push(record("s2", RequestKind::Subordinate, false));

        let doc = log.document(Scope::PrimaryOnly, ts("2025-03-01T11:00:00Z"));
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.summary.total, 1);
        assert_eq!(doc.summary.ech_percent, 100.0);

        let doc = log.document(Scope::All, ts("2025-03-01T11:00:00Z"));
        assert_eq!(doc.entries.len(), 3);
        assert_eq!(doc.summary.total, 3);
        assert_eq!(doc.summary.ech_percent, 33.33);
    }

    #[test]
    fn json_uses_iso_timestamps() {
        let mut log = ExportLog::new();
        log.push(record("p", RequestKind::Primary, true));
        let json = log
            .document(Scope::All, ts("2025-03-01T11:00:00Z"))
            .to_json()
            .expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(value["generatedAt"], "2025-03-01T11:00:00Z");
        assert_eq!(value["scope"], "all");
        assert_eq!(value["entries"][0]["timestamp"], "2025-03-01T10:00:00.250Z");
        assert_eq!(value["entries"][0]["resourceType"], "main_frame");
    }

    #[test]
    fn empty_log_exports_zero_summary() {
        let log = ExportLog::new();
        let doc = log.document(Scope::All, ts("2025-03-01T11:00:00Z"));
        assert!(doc.entries.is_empty());
        assert_eq!(doc.summary, Summary::default());
    }
}
