use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{GroupId, RequestId, TabId};

/// Resource type as reported by the browser's request API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Imageset,
    Font,
    Object,
    ObjectSubrequest,
    #[serde(rename = "xmlhttprequest")]
    XmlHttpRequest,
    Ping,
    Beacon,
    Media,
    Websocket,
    CspReport,
    WebManifest,
    Speculative,
    Json,
    #[serde(other)]
    Other,
}

impl ResourceType {
    pub fn is_main_frame(self) -> bool {
        self == Self::MainFrame
    }
}

/// Role of a request within a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Top-level document navigation.
    Primary,
    /// Any other resource fetched for that navigation.
    Subordinate,
}

impl RequestKind {
    pub fn classify(resource_type: ResourceType) -> Self {
        if resource_type.is_main_frame() {
            Self::Primary
        } else {
            Self::Subordinate
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Subordinate => "subordinate",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security properties of a request. Either field may still be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityInfo {
    #[serde(default)]
    pub used_ech: Option<bool>,
    #[serde(default)]
    pub used_private_dns: Option<bool>,
}

impl SecurityInfo {
    pub fn known(used_ech: bool, used_private_dns: bool) -> Self {
        Self {
            used_ech: Some(used_ech),
            used_private_dns: Some(used_private_dns),
        }
    }

    /// Both properties, or `None` while either is still unknown.
    pub fn resolved(&self) -> Option<(bool, bool)> {
        Some((self.used_ech?, self.used_private_dns?))
    }
}

/// Raw per-request delivery metadata (headers received).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub tab_id: TabId,
    pub request_id: RequestId,
    pub url: String,
    #[serde(alias = "timeStamp", with = "epoch_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(rename = "type", alias = "resourceType")]
    pub resource_type: ResourceType,
    /// Present when the source already resolved security properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_info: Option<SecurityInfo>,
}

impl Observation {
    pub fn kind(&self) -> RequestKind {
        RequestKind::classify(self.resource_type)
    }
}

/// A finalized, immutable request record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub tab_id: TabId,
    pub request_id: RequestId,
    pub group_id: GroupId,
    pub kind: RequestKind,
    pub resource_type: ResourceType,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub ip: Option<String>,
    pub status_code: u16,
    pub from_cache: bool,
    pub used_ech: bool,
    pub used_private_dns: bool,
}

impl RequestRecord {
    pub fn finalize(
        observation: Observation,
        group_id: GroupId,
        used_ech: bool,
        used_private_dns: bool,
    ) -> Self {
        Self {
            kind: observation.kind(),
            tab_id: observation.tab_id,
            request_id: observation.request_id,
            group_id,
            resource_type: observation.resource_type,
            url: observation.url,
            timestamp: observation.timestamp,
            ip: observation.ip,
            status_code: observation.status_code,
            from_cache: observation.from_cache,
            used_ech,
            used_private_dns,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.kind == RequestKind::Primary
    }
}

// Browser timestamps are fractional epoch milliseconds.
mod epoch_millis {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(t.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let ms = f64::deserialize(d)?;
        if !ms.is_finite() {
            return Err(serde::de::Error::custom("timestamp is not a finite number"));
        }
        let micros = (ms * 1000.0).round() as i64;
        Utc.timestamp_micros(micros)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}")))
    }
}
