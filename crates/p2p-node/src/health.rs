//! Aggregates the per-component `HealthEvent` stream into the single
//! `{ok, issues[]}` view the hosting application polls.

use std::collections::HashMap;
use std::sync::Arc;

use p2p_types::HealthEvent;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Snapshot returned by [`crate::Node::health`]; serializable so the hosting
/// application can expose it verbatim over its own status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    pub ok: bool,
    pub issues: Vec<String>,
}

/// Keeps the most recent event per component and derives `NodeHealth` from
/// whichever of them are currently unhealthy.
pub struct HealthAggregator {
    latest: RwLock<HashMap<&'static str, HealthEvent>>,
}

impl HealthAggregator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { latest: RwLock::new(HashMap::new()) })
    }

    /// Drains `rx` until `cancel` fires, recording the latest event per
    /// component as it arrives.
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::Receiver<HealthEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => {
                        match event {
                            Some(event) => {
                                if !event.ok {
                                    tracing::warn!(component = event.component, detail = %event.detail, "component health issue");
                                }
                                self.latest.write().insert(event.component, event);
                            }
                            None => break,
                        }
                    }
                }
            }
        })
    }

    pub fn snapshot(&self) -> NodeHealth {
        let latest = self.latest.read();
        let issues: Vec<String> = latest
            .values()
            .filter(|e| !e.ok)
            .map(|e| format!("{}: {}", e.component, e.detail))
            .collect();
        NodeHealth { ok: issues.is_empty(), issues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_until_an_issue_arrives() {
        let aggregator = HealthAggregator::new();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = aggregator.clone().spawn(rx, cancel.clone());

        assert!(aggregator.snapshot().ok);

        tx.send(HealthEvent::issue("reputation", "disk full")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let snapshot = aggregator.snapshot();
        assert!(!snapshot.ok);
        assert_eq!(snapshot.issues, vec!["reputation: disk full".to_string()]);

        tx.send(HealthEvent::ok("reputation", "recovered")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(aggregator.snapshot().ok);

        cancel.cancel();
        handle.await.unwrap();
    }
}
