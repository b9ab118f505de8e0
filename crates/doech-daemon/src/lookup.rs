//! Security info lookup.
//!
//! The browser answers `getSecurityInfo(requestId)` asynchronously. The
//! orchestrator spawns one lookup per pending request; its result re-enters
//! the loop as an ordinary `security-info` event.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use doech_core::types::{RequestId, SecurityInfo};

pub type LookupFuture = Pin<Box<dyn Future<Output = Option<SecurityInfo>> + Send + 'static>>;

/// Resolves the security properties of one request. `None` means the lookup
/// failed; the observation then expires through the pending timeout.
pub trait SecurityInfoLookup: Send + Sync + 'static {
    fn lookup(&self, request_id: RequestId) -> LookupFuture;
}

/// Lookup answering from a fixed table. Unknown ids resolve to `None`.
#[derive(Debug, Default)]
pub struct StaticLookup {
    table: Mutex<HashMap<RequestId, SecurityInfo>>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request_id: impl Into<RequestId>, info: SecurityInfo) {
        if let Ok(mut table) = self.table.lock() {
            table.insert(request_id.into(), info);
        }
    }
}

impl SecurityInfoLookup for StaticLookup {
    fn lookup(&self, request_id: RequestId) -> LookupFuture {
        let info = self
            .table
            .lock()
            .ok()
            .and_then(|table| table.get(&request_id).copied());
        Box::pin(async move { info })
    }
}
