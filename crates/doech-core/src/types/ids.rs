use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser-assigned tab identifier. `-1` marks a request that belongs to no tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl TabId {
    /// Sentinel used by the browser for background / non-tab requests.
    pub const NONE: TabId = TabId(-1);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TabId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// Opaque request identifier, unique within the observation source's lifetime.
///
/// Browsers hand these out as strings or integers; both deserialize here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Int(u64),
        }
        Ok(match Raw::deserialize(d)? {
            Raw::Str(s) => Self(s),
            Raw::Int(n) => Self(n.to_string()),
        })
    }
}

/// Identity of a navigation group: the request id of its primary request.
pub type GroupId = RequestId;

/// One lifetime of a tab id. A removed tab whose numeric id is later reused
/// gets a new instance, so late writes for the old one can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabInstance {
    pub tab_id: TabId,
    pub generation: u64,
}
