//! The composition root: builds the five components in dependency order,
//! starts their background tasks, and exposes the narrow application-facing
//! surface described for the node facade. Nothing above this module reaches
//! into a component's internals directly.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use p2p_addrbook::AddressBookManager;
use p2p_peer_manager::{Dialer, PeerManager, PeerManagerEvent};
use p2p_protocol::{NodeIdentity, ProtocolEngine, TcpDialer};
use p2p_reputation::ReputationManager;
use p2p_sync::{BlockSink, StatusPayload, SyncEngine, SyncMode};
use p2p_types::{HealthEvent, MessageType, PeerId, Timestamp};

use crate::bootstrap::Bootstrapper;
use crate::config::NodeConfig;
use crate::errors::NodeError;
use crate::health::{HealthAggregator, NodeHealth};

fn now_from_system_clock() -> Timestamp {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Timestamp::new(secs)
}

/// A running (or not-yet-started) node: the five networking components plus
/// the glue between them. Generic over the application's [`BlockSink`] so
/// sync deliveries never have to cross a trait-object boundary.
pub struct Node<S: BlockSink + 'static> {
    config: NodeConfig,
    reputation: Arc<ReputationManager>,
    addrbook: Arc<AddressBookManager>,
    peer_manager: Arc<PeerManager>,
    protocol: Arc<ProtocolEngine>,
    sync: Arc<SyncEngine<S>>,
    health: Arc<HealthAggregator>,
    bootstrapper: Bootstrapper,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: BlockSink + 'static> Node<S> {
    /// Wires reputation, address book, protocol engine, peer manager and
    /// sync engine together. Does not open any sockets or spawn any
    /// background task; call [`Node::start`] for that.
    pub async fn new(config: NodeConfig, identity: NodeIdentity, local_height: u64, sink: Arc<S>) -> Result<Self, NodeError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            NodeError::Config(crate::config::ConfigError::Read {
                path: config.data_dir.clone(),
                source: e,
            })
        })?;
        let bootstrapper = Bootstrapper::from_config(&config)?;

        let (health_tx, health_rx) = mpsc::channel(256);
        let health = HealthAggregator::new();
        let cancel = CancellationToken::new();
        let health_task = Arc::clone(&health).spawn(health_rx, cancel.clone());

        let reputation = ReputationManager::new(config.reputation_config()?, config.data_dir.join("reputation"), health_tx.clone());
        reputation.load().await;

        let addrbook = AddressBookManager::new(config.addrbook_config(), identity.peer_id, config.data_dir.clone(), health_tx.clone());
        addrbook.load().await;

        let protocol = ProtocolEngine::new(identity, config.protocol_config(), Arc::clone(&reputation), Arc::clone(&addrbook), health_tx.clone());

        let dialer: Arc<dyn Dialer> = Arc::new(TcpDialer::new(Arc::clone(&protocol)));
        let (peer_manager, events_rx) = PeerManager::new(
            config.peer_manager_config(),
            Arc::clone(&reputation),
            Arc::clone(&addrbook),
            dialer,
            health_tx.clone(),
        );
        protocol.set_peer_manager(Arc::clone(&peer_manager));

        let sync = SyncEngine::new(config.sync_config(), Arc::clone(&protocol), Arc::clone(&reputation), sink, local_height, health_tx);

        let node = Self {
            config,
            reputation,
            addrbook,
            peer_manager,
            protocol,
            sync,
            health,
            bootstrapper,
            cancel,
            tasks: Mutex::new(vec![health_task]),
        };
        node.spawn_event_router(events_rx);
        Ok(node)
    }

    /// Relays connection-lifecycle events onto the log and, on a fresh
    /// connection, sends a `Status` so the peer's sync engine learns our
    /// height without waiting for the next gossip broadcast.
    fn spawn_event_router(&self, mut events_rx: mpsc::Receiver<PeerManagerEvent>) {
        let protocol = Arc::clone(&self.protocol);
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events_rx.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            PeerManagerEvent::Connected { id, direction, .. } => {
                                tracing::info!(peer = %id, direction = ?direction, "peer connected");
                                let payload = StatusPayload { best_height: protocol.local_height().max(0) as u64 }.encode();
                                let _ = protocol.send_to(id, MessageType::Status, payload);
                            }
                            PeerManagerEvent::Disconnected { id, .. } => {
                                tracing::info!(peer = %id, "peer disconnected");
                            }
                            PeerManagerEvent::DialFailed { id, addr } => {
                                tracing::debug!(peer = %id, ?addr, "dial failed");
                            }
                            PeerManagerEvent::Evicted { id } => {
                                tracing::info!(peer = %id, "peer evicted under inbound pressure");
                            }
                        }
                    }
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Binds the listener, starts every component's background loop, and
    /// seeds the address book and connection manager from the configured
    /// peer lists. Returns once the listener socket is bound; all other work
    /// continues on spawned tasks until [`Node::stop`] is called.
    pub async fn start(&self) -> Result<(), NodeError> {
        let bind_addr: SocketAddr = self
            .config
            .network
            .listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| NodeError::InvalidListenAddr(self.config.network.listen_addr.clone(), e.to_string()))?;

        let listener_engine = Arc::clone(&self.protocol);
        let listener_cancel = self.cancel.clone();
        self.tasks.lock().push(tokio::spawn(async move {
            listener_engine.run_listener(bind_addr, listener_cancel).await;
        }));

        self.tasks.lock().push(Arc::clone(&self.reputation).start(self.cancel.clone()));
        self.tasks.lock().push(Arc::clone(&self.addrbook).start(self.cancel.clone()));
        self.tasks.lock().push(Arc::clone(&self.protocol).start(self.cancel.clone()));
        self.tasks.lock().push(Arc::clone(&self.peer_manager).start(self.cancel.clone()));
        self.tasks.lock().push(Arc::clone(&self.sync).start(self.cancel.clone()));

        self.bootstrapper.run(&self.addrbook, &self.peer_manager, now_from_system_clock()).await;

        tracing::info!(listen_addr = %bind_addr, "node started");
        Ok(())
    }

    /// Cancels every background task, waits for them to finish, and flushes
    /// reputation and address book state to disk.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            let _ = handle.await;
        }
        self.reputation.flush().await;
        self.addrbook.flush().await;
        tracing::info!("node stopped");
    }

    /// Combines each component's latest health event with a couple of
    /// synthetic checks the facade is positioned to make on their behalf:
    /// the listener accepted at least one connection attempt was possible,
    /// and the outbound floor is met.
    pub fn health(&self) -> NodeHealth {
        let mut snapshot = self.health.snapshot();
        let stats = self.peer_manager.stats();
        if stats.outbound_count < self.config.network.min_outbound {
            snapshot.ok = false;
            snapshot.issues.push(format!(
                "outbound peers {} below floor {}",
                stats.outbound_count, self.config.network.min_outbound
            ));
        }
        snapshot
    }

    pub fn broadcast(&self, msg_type: MessageType, payload: Vec<u8>) {
        self.protocol.broadcast(msg_type, payload);
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.peer_manager.peers()
    }

    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.protocol.is_connected(id)
    }

    pub fn local_height(&self) -> i64 {
        self.protocol.local_height()
    }

    pub fn set_local_height(&self, height: i64) {
        self.protocol.set_local_height(height);
    }

    pub fn sync_status(&self) -> (SyncMode, u64, u64) {
        self.sync.status()
    }

    pub fn is_caught_up(&self) -> bool {
        self.sync.is_caught_up()
    }

    pub async fn begin_snapshot_sync(&self, near_height: u64) -> Result<(), NodeError> {
        Ok(self.sync.begin_snapshot_sync(near_height).await?)
    }

    /// Health events not yet consumed by [`Node::health`], exposed mainly
    /// for a hosting application that wants to stream rather than poll.
    pub fn health_events(&self) -> &HealthAggregator {
        &self.health
    }
}

/// Convenience re-export for callers that only need `HealthEvent` from this
/// crate's public surface without reaching into `p2p_types` directly.
pub type HealthSink = mpsc::Sender<HealthEvent>;
