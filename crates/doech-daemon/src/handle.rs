//! Cloneable client handle for a running orchestrator.

use doech_core::correlator::Diagnostics;
use doech_core::export::ExportDocument;
use doech_core::protocol::{SinkMessage, SinkRequest, TabSnapshot};
use doech_core::types::{Scope, Summary, TabId};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::DaemonError;

/// Read-only queries answered inside the event loop.
#[derive(Debug)]
pub(crate) enum Query {
    Snapshot {
        tab_id: TabId,
        reply: oneshot::Sender<TabSnapshot>,
    },
    Export {
        scope: Scope,
        reply: oneshot::Sender<ExportDocument>,
    },
    GlobalSummary {
        include_subordinate: bool,
        reply: oneshot::Sender<Summary>,
    },
    Diagnostics {
        reply: oneshot::Sender<Diagnostics>,
    },
}

#[derive(Debug, Clone)]
pub struct MonitorHandle {
    query_tx: mpsc::Sender<Query>,
    notify_tx: broadcast::Sender<SinkMessage>,
}

impl MonitorHandle {
    pub(crate) fn new(
        query_tx: mpsc::Sender<Query>,
        notify_tx: broadcast::Sender<SinkMessage>,
    ) -> Self {
        Self {
            query_tx,
            notify_tx,
        }
    }

    /// Receive every sink message pushed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SinkMessage> {
        self.notify_tx.subscribe()
    }

    pub async fn refresh(&self, tab_id: TabId) -> Result<TabSnapshot, DaemonError> {
        self.ask(|reply| Query::Snapshot { tab_id, reply }).await
    }

    pub async fn export(&self, scope: Scope) -> Result<ExportDocument, DaemonError> {
        self.ask(|reply| Query::Export { scope, reply }).await
    }

    pub async fn global_summary(&self, include_subordinate: bool) -> Result<Summary, DaemonError> {
        self.ask(|reply| Query::GlobalSummary {
            include_subordinate,
            reply,
        })
        .await
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics, DaemonError> {
        self.ask(|reply| Query::Diagnostics { reply }).await
    }

    /// Answer a decoded sink request.
    pub async fn request(&self, request: SinkRequest) -> Result<SinkMessage, DaemonError> {
        match request {
            SinkRequest::RefreshRequest(tab) => {
                self.refresh(tab.tab_id).await.map(SinkMessage::Snapshot)
            }
            SinkRequest::Export(req) => self.export(req.scope).await.map(SinkMessage::Export),
        }
    }

    async fn ask<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Query,
    ) -> Result<T, DaemonError> {
        let (reply, rx) = oneshot::channel();
        self.query_tx
            .send(build(reply))
            .await
            .map_err(|_| DaemonError::LoopClosed)?;
        rx.await.map_err(|_| DaemonError::ReplyDropped)
    }
}
