//! Wire messages between the host, the monitor and presentation sinks.
//!
//! Every message is `{"type": <tag>, "data": {...}}`. Tags are closed enums;
//! an unknown tag is a decode error, not a silently ignored message.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::export::ExportDocument;
use crate::types::{
    Observation, RequestId, RequestRecord, Scope, SecurityInfo, SummaryPair, TabId,
};

// ─── Host → monitor ───────────────────────────────────────────────

/// Browser tab loading status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRef {
    pub tab_id: TabId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabUpdate {
    pub tab_id: TabId,
    pub status: TabStatus,
}

/// Result of a security lookup for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityResolved {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub info: SecurityInfo,
}

/// Events delivered by the browser host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum HostEvent {
    HeadersReceived(Observation),
    SecurityInfo(SecurityResolved),
    TabActivated(TabRef),
    TabRemoved(TabRef),
    TabUpdated(TabUpdate),
}

impl HostEvent {
    pub fn decode(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(CoreError::MalformedMessage)
    }

    /// Decode one raw line. Invalid UTF-8 is a malformed message, not an IO error.
    pub fn decode_bytes(json: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(json).map_err(CoreError::MalformedMessage)
    }

    /// Tab the event concerns, when it names one directly.
    pub fn tab_id(&self) -> Option<TabId> {
        match self {
            Self::HeadersReceived(obs) => Some(obs.tab_id),
            Self::SecurityInfo(_) => None,
            Self::TabActivated(t) | Self::TabRemoved(t) => Some(t.tab_id),
            Self::TabUpdated(u) => Some(u.tab_id),
        }
    }
}

// ─── Sink → monitor ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub scope: Scope,
}

/// Requests a presentation sink may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum SinkRequest {
    /// Ask for the current snapshot of a tab.
    RefreshRequest(TabRef),
    /// Ask for the export document.
    Export(ExportRequest),
}

impl SinkRequest {
    pub fn decode(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(CoreError::MalformedMessage)
    }

    /// Decode one raw line. Invalid UTF-8 is a malformed message, not an IO error.
    pub fn decode_bytes(json: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(json).map_err(CoreError::MalformedMessage)
    }
}

// ─── Monitor → sink ───────────────────────────────────────────────

/// Full view of one tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub tab_id: TabId,
    pub entries: Vec<RequestRecord>,
    pub summaries: SummaryPair,
}

impl TabSnapshot {
    pub fn empty(tab_id: TabId) -> Self {
        Self {
            tab_id,
            entries: Vec::new(),
            summaries: SummaryPair::default(),
        }
    }
}

/// One newly finalized record plus the tab's refreshed summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryAdded {
    pub tab_id: TabId,
    pub record: RequestRecord,
    pub summaries: SummaryPair,
}

/// Messages pushed to presentation sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum SinkMessage {
    EntryAdded(EntryAdded),
    Snapshot(TabSnapshot),
    Export(ExportDocument),
}

impl SinkMessage {
    pub fn encode(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::Export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceType;

    #[test]
    fn decodes_headers_received() {
        let json = r#"{"type":"headers-received","data":{
            "tabId":1,"requestId":"10","url":"https://a.test/","timeStamp":1700000000000,
            "statusCode":200,"fromCache":false,"type":"main_frame"}}"#;
        match HostEvent::decode(json).expect("decode") {
            HostEvent::HeadersReceived(obs) => {
                assert_eq!(obs.tab_id, TabId(1));
                assert_eq!(obs.resource_type, ResourceType::MainFrame);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_security_info_with_missing_fields() {
        let json = r#"{"type":"security-info","data":{"requestId":"10","usedEch":true}}"#;
        match HostEvent::decode(json).expect("decode") {
            HostEvent::SecurityInfo(resolved) => {
                assert_eq!(resolved.request_id, RequestId::new("10"));
                assert_eq!(resolved.info.used_ech, Some(true));
                assert_eq!(resolved.info.used_private_dns, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_tab_lifecycle() {
        let ev =
            HostEvent::decode(r#"{"type":"tab-updated","data":{"tabId":4,"status":"loading"}}"#)
                .expect("decode");
        assert_eq!(
            ev,
            HostEvent::TabUpdated(TabUpdate {
                tab_id: TabId(4),
                status: TabStatus::Loading
            })
        );
        assert_eq!(ev.tab_id(), Some(TabId(4)));

        let ev =
            HostEvent::decode(r#"{"type":"tab-updated","data":{"tabId":4,"status":"unloaded"}}"#)
                .expect("decode");
        assert!(matches!(
            ev,
            HostEvent::TabUpdated(TabUpdate {
                status: TabStatus::Other,
                ..
            })
        ));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let err = SinkRequest::decode(r#"{"type":"doechRequestUpdate","data":{"tabId":1}}"#)
            .expect_err("unknown tag");
        assert!(matches!(err, CoreError::MalformedMessage(_)));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let err = HostEvent::decode_bytes(b"\xff\xfe{\"type\":\"tab-removed\"}")
            .expect_err("not utf-8");
        assert!(matches!(err, CoreError::MalformedMessage(_)));

        let ev = HostEvent::decode_bytes(br#"{"type":"tab-removed","data":{"tabId":3}}"#)
            .expect("decode");
        assert_eq!(ev, HostEvent::TabRemoved(TabRef { tab_id: TabId(3) }));
    }

    #[test]
    fn decodes_sink_requests() {
        let req = SinkRequest::decode(r#"{"type":"refresh-request","data":{"tabId":9}}"#)
            .expect("decode");
        assert_eq!(req, SinkRequest::RefreshRequest(TabRef { tab_id: TabId(9) }));

        let req = SinkRequest::decode(r#"{"type":"export","data":{"scope":"primary-only"}}"#)
            .expect("decode");
        assert_eq!(
            req,
            SinkRequest::Export(ExportRequest {
                scope: Scope::PrimaryOnly
            })
        );

        let req = SinkRequest::decode(r#"{"type":"export","data":{}}"#).expect("decode");
        assert_eq!(req, SinkRequest::Export(ExportRequest { scope: Scope::All }));
    }

    #[test]
    fn snapshot_encodes_with_type_tag() {
        let msg = SinkMessage::Snapshot(TabSnapshot::empty(TabId(3)));
        let json: serde_json::Value =
            serde_json::from_str(&msg.encode().expect("encode")).expect("valid json");
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["data"]["tabId"], 3);
        assert_eq!(json["data"]["entries"], serde_json::json!([]));
        assert_eq!(json["data"]["summaries"]["all"]["total"], 0);
    }
}
