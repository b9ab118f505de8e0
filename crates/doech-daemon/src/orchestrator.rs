use std::sync::Arc;

use chrono::{DateTime, Utc};
use doech_core::Monitor;
use doech_core::protocol::{HostEvent, SecurityResolved, SinkMessage};
use doech_core::types::RequestId;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handle::{MonitorHandle, Query};
use crate::lookup::SecurityInfoLookup;

/// Capacity of the internal channels (lookup results, handle queries).
const INTERNAL_CHANNEL_CAPACITY: usize = 256;

/// Single event loop around a [`Monitor`].
///
/// Host events, lookup results, handle queries and the expiry sweep are all
/// serialized through `run`, so every monitor step is atomic.
pub struct Orchestrator {
    monitor: Monitor,
    /// Receives events from the host (browser bridge, stream sources).
    host_rx: mpsc::Receiver<HostEvent>,
    /// Spawned lookups report back through this pair.
    lookup_tx: mpsc::Sender<HostEvent>,
    lookup_rx: mpsc::Receiver<HostEvent>,
    query_tx: mpsc::Sender<Query>,
    query_rx: mpsc::Receiver<Query>,
    /// Broadcasts sink messages to all subscribers.
    notify_tx: broadcast::Sender<SinkMessage>,
    lookup: Option<Arc<dyn SecurityInfoLookup>>,
    /// Wall clock at construction, advanced by the runtime's monotonic clock.
    epoch: DateTime<Utc>,
    started: Instant,
    /// Cancellation token for graceful shutdown.
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        monitor: Monitor,
        host_rx: mpsc::Receiver<HostEvent>,
        notify_tx: broadcast::Sender<SinkMessage>,
    ) -> Self {
        Self::with_cancel(monitor, host_rx, notify_tx, CancellationToken::new())
    }

    /// Create an orchestrator with an explicit cancellation token for graceful shutdown.
    pub fn with_cancel(
        monitor: Monitor,
        host_rx: mpsc::Receiver<HostEvent>,
        notify_tx: broadcast::Sender<SinkMessage>,
        cancel: CancellationToken,
    ) -> Self {
        let (lookup_tx, lookup_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);
        let (query_tx, query_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);
        Self {
            monitor,
            host_rx,
            lookup_tx,
            lookup_rx,
            query_tx,
            query_rx,
            notify_tx,
            lookup: None,
            epoch: Utc::now(),
            started: Instant::now(),
            cancel,
        }
    }

    /// Resolve pending observations through `lookup` instead of waiting for
    /// `security-info` events from the host.
    pub fn with_lookup(mut self, lookup: Arc<dyn SecurityInfoLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle::new(self.query_tx.clone(), self.notify_tx.clone())
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Main event loop. Runs until the host channel is closed or the
    /// cancellation token is triggered.
    pub async fn run(&mut self) {
        info!(
            lookup = self.lookup.is_some(),
            sweep_ms = self.monitor.config().sweep_interval_ms,
            "monitor: event loop started"
        );
        let mut sweep = tokio::time::interval(self.monitor.config().sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.host_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("monitor: host channel closed, shutting down");
                            break;
                        }
                    }
                }
                Some(event) = self.lookup_rx.recv() => self.handle_event(event),
                Some(query) = self.query_rx.recv() => self.answer(query),
                _ = sweep.tick() => {
                    let now = self.now();
                    let expired = self.monitor.sweep(now);
                    if expired > 0 {
                        debug!(expired, "monitor: expired unresolved observations");
                    }
                }
                _ = self.cancel.cancelled() => {
                    info!("monitor: cancellation requested, shutting down");
                    break;
                }
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.epoch + elapsed
    }

    fn handle_event(&mut self, event: HostEvent) {
        let observed = match &event {
            HostEvent::HeadersReceived(obs) => Some(obs.request_id.clone()),
            _ => None,
        };

        let now = self.now();
        for msg in self.monitor.handle(event, now) {
            // No subscribers is fine; sinks come and go.
            let _ = self.notify_tx.send(msg);
        }

        if let Some(request_id) = observed {
            if self.monitor.is_pending(&request_id) {
                self.spawn_lookup(request_id);
            }
        }
    }

    fn spawn_lookup(&self, request_id: RequestId) {
        let Some(lookup) = self.lookup.clone() else {
            return;
        };
        let tx = self.lookup_tx.clone();
        let cancel = self.cancel.clone();
        let timeout = self.monitor.config().pending_timeout();

        tokio::spawn(async move {
            let pending = lookup.lookup(request_id.clone());
            let info = tokio::select! {
                res = tokio::time::timeout(timeout, pending) => match res {
                    Ok(Some(info)) => info,
                    Ok(None) => {
                        debug!(request_id = %request_id, "security lookup failed");
                        return;
                    }
                    Err(_) => {
                        debug!(request_id = %request_id, "security lookup timed out");
                        return;
                    }
                },
                _ = cancel.cancelled() => return,
            };
            let event = HostEvent::SecurityInfo(SecurityResolved { request_id, info });
            let _ = tx.send(event).await;
        });
    }

    fn answer(&self, query: Query) {
        // A dropped receiver means the caller gave up; nothing to do.
        match query {
            Query::Snapshot { tab_id, reply } => {
                let _ = reply.send(self.monitor.snapshot(tab_id));
            }
            Query::Export { scope, reply } => {
                let _ = reply.send(self.monitor.export(scope, self.now()));
            }
            Query::GlobalSummary {
                include_subordinate,
                reply,
            } => {
                let _ = reply.send(self.monitor.global_summary(include_subordinate));
            }
            Query::Diagnostics { reply } => {
                let _ = reply.send(self.monitor.diagnostics());
            }
        }
    }
}
