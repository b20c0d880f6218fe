//! Protocol engine: the facade everything above the wire speaks to. Owns
//! the live connection table, runs one read task and one write task per
//! peer, and drives the handshake, gossip, peer-exchange and liveness
//! concerns that do not belong to any single connection.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use p2p_addrbook::AddressBookManager;
use p2p_peer_manager::{AcceptResult, PeerManager};
use p2p_reputation::{PeerEventKind, ReputationManager};
use p2p_types::{
    Direction, HandshakeAckPayload, HandshakePayload, HealthEvent, MessageEnvelope, MessageType, NetAddr, PeerId,
    PeerSource, Timestamp,
};

use crate::config::ProtocolConfig;
use crate::connection::{run_writer, FrameReader, PeerHandle};
use crate::dedup::{fingerprint, GossipDedup};
use crate::dialer::to_net_addr;
use crate::errors::ProtocolError;
use crate::gossip::{select_gossip_targets, GossipPeer};
use crate::handshake::{verify_handshake, NodeIdentity, RejectReason, SignedHandshake};
use crate::heartbeat::{decode_nonce, encode_nonce, PingState};
use crate::pex::{self, PexEntry};
use crate::rate_limit::PeerRateLimiters;
use crate::router::{Handler, HandlerRegistry};

/// Consecutive rate-limit windows a peer can exceed before it is temp-banned
/// and disconnected, per spec scenario: "after sustained violation across 3
/// consecutive windows, peer is disconnected".
const RATE_LIMIT_BAN_THRESHOLD: u32 = 3;

fn now_from_system_clock() -> Timestamp {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Timestamp::new(secs)
}

/// Snapshot of a live connection returned by [`ProtocolEngine::peers`].
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub id: PeerId,
    pub addr: NetAddr,
    pub direction: Direction,
    pub score: f64,
    pub connected_at: Timestamp,
}

struct ConnectionEntry {
    handle: PeerHandle,
    connected_at: Timestamp,
    ping: Mutex<PingState>,
    limiters: PeerRateLimiters,
    /// Consecutive rate-limiter rejections with no successful message in
    /// between; reset to zero the moment a message passes. Sustained abuse
    /// across [`RATE_LIMIT_BAN_THRESHOLD`] in a row escalates to a temp ban.
    consecutive_rate_violations: std::sync::atomic::AtomicU32,
    reader_task: tokio::task::AbortHandle,
}

/// Accumulates bytes during the handshake exchange, before a connection has
/// a registered read/write task pair. Frames decoded ahead of the one the
/// caller asked for are queued in `pending` rather than dropped, since a
/// peer that pipelines its first application message behind the handshake
/// ack is otherwise starved of it.
struct HandshakeIo {
    read_half: OwnedReadHalf,
    write_half: OwnedWriteHalf,
    framer: FrameReader,
    pending: VecDeque<MessageEnvelope>,
}

impl HandshakeIo {
    fn new(read_half: OwnedReadHalf, write_half: OwnedWriteHalf) -> Self {
        Self { read_half, write_half, framer: FrameReader::new(), pending: VecDeque::new() }
    }

    async fn write_envelope(&mut self, envelope: MessageEnvelope, timeout: Duration) -> Result<(), ProtocolError> {
        let bytes = envelope.encode().map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        tokio::time::timeout(timeout, self.write_half.write_all(&bytes))
            .await
            .map_err(|_| ProtocolError::Timeout)?
            .map_err(|e| ProtocolError::Io(e.to_string()))
    }

    async fn read_envelope(&mut self, timeout: Duration) -> Result<MessageEnvelope, ProtocolError> {
        if let Some(env) = self.pending.pop_front() {
            return Ok(env);
        }
        let mut buf = [0u8; 4096];
        loop {
            let n = tokio::time::timeout(timeout, self.read_half.read(&mut buf))
                .await
                .map_err(|_| ProtocolError::Timeout)?
                .map_err(|e| ProtocolError::Io(e.to_string()))?;
            if n == 0 {
                return Err(ProtocolError::Io("connection closed during handshake".to_string()));
            }
            self.framer.feed(&buf[..n]);
            let frames = self.framer.drain().map_err(|e| ProtocolError::Malformed(e.to_string()))?;
            if !frames.is_empty() {
                self.pending.extend(frames);
                return Ok(self.pending.pop_front().expect("just extended"));
            }
        }
    }
}

pub struct ProtocolEngine {
    identity: NodeIdentity,
    config: ProtocolConfig,
    reputation: Arc<ReputationManager>,
    addrbook: Arc<AddressBookManager>,
    peer_manager: OnceLock<Arc<PeerManager>>,
    connections: RwLock<HashMap<PeerId, Arc<ConnectionEntry>>>,
    handlers: HandlerRegistry,
    dedup: GossipDedup,
    local_height: AtomicI64,
    health_tx: mpsc::Sender<HealthEvent>,
}

impl ProtocolEngine {
    pub fn new(
        identity: NodeIdentity,
        config: ProtocolConfig,
        reputation: Arc<ReputationManager>,
        addrbook: Arc<AddressBookManager>,
        health_tx: mpsc::Sender<HealthEvent>,
    ) -> Arc<Self> {
        let dedup = GossipDedup::new(config.dedup_shards, config.dedup_ttl);
        Arc::new(Self {
            identity,
            config,
            reputation,
            addrbook,
            peer_manager: OnceLock::new(),
            connections: RwLock::new(HashMap::new()),
            handlers: HandlerRegistry::new(),
            dedup,
            local_height: AtomicI64::new(0),
            health_tx,
        })
    }

    /// Wires the peer manager after construction: `PeerManager::new` needs
    /// a `Dialer` that itself needs the engine, so the two are assembled in
    /// two steps rather than each owning the other directly.
    pub fn set_peer_manager(&self, peer_manager: Arc<PeerManager>) {
        let _ = self.peer_manager.set(peer_manager);
    }

    fn peer_manager(&self) -> &Arc<PeerManager> {
        self.peer_manager.get().expect("peer manager must be wired before the engine accepts connections")
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn local_height(&self) -> i64 {
        self.local_height.load(Ordering::Relaxed)
    }

    pub fn set_local_height(&self, height: i64) {
        self.local_height.store(height, Ordering::Relaxed);
    }

    pub fn register_handler(&self, msg_type: MessageType, handler: Arc<dyn Handler>) {
        self.handlers.register(msg_type, handler);
    }

    pub fn peers(&self) -> Vec<PeerSnapshot> {
        self.connections
            .read()
            .values()
            .map(|c| PeerSnapshot {
                id: c.handle.id,
                addr: c.handle.addr,
                direction: c.handle.direction,
                score: self.reputation.score_of(&c.handle.id).unwrap_or(0.0),
                connected_at: c.connected_at,
            })
            .collect()
    }

    pub fn peer_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.connections.read().contains_key(id)
    }

    pub fn send_to(&self, peer: PeerId, msg_type: MessageType, payload: Vec<u8>) -> Result<(), ProtocolError> {
        let conn = self.connections.read().get(&peer).cloned().ok_or(ProtocolError::NotConnected)?;
        if conn.handle.send(MessageEnvelope::new(msg_type, payload)) {
            p2p_telemetry::MESSAGES_SENT.inc();
            Ok(())
        } else {
            Err(ProtocolError::Io("outbound queue full or closed".to_string()))
        }
    }

    /// Sends to every connected peer for non-gossip types; for gossip
    /// classes, fans out to at most `fanout` peers chosen by reputation,
    /// skipping anyone the dedup set already marked as told.
    pub fn broadcast(&self, msg_type: MessageType, payload: Vec<u8>) {
        match msg_type.gossip_class() {
            Some(class) => {
                let fp = fingerprint(&payload);
                let candidates: Vec<GossipPeer> = self
                    .connections
                    .read()
                    .values()
                    .map(|c| GossipPeer { id: c.handle.id, score: self.reputation.score_of(&c.handle.id).unwrap_or(0.0) })
                    .collect();
                let targets = select_gossip_targets(&candidates, class, fp, &self.dedup, &self.config);
                for id in targets {
                    if self.send_to(id, msg_type, payload.clone()).is_ok() {
                        self.dedup.mark_told(fp, id);
                    }
                }
            }
            None => {
                let ids: Vec<PeerId> = self.connections.read().keys().copied().collect();
                for id in ids {
                    let _ = self.send_to(id, msg_type, payload.clone());
                }
            }
        }
    }

    pub fn disconnect(&self, id: PeerId) {
        if let Some(conn) = self.connections.write().remove(&id) {
            conn.reader_task.abort();
        }
        if let Some(pm) = self.peer_manager.get() {
            pm.disconnect(&id);
        }
    }

    /// Runs the mutual handshake over a fresh socket and, on success,
    /// registers the connection's read and write tasks. For inbound
    /// connections this also asks the peer manager whether to admit the
    /// slot before acknowledging; for outbound, the manager already
    /// screened the dial before calling into the `Dialer`.
    pub async fn handshake_and_register(
        self: &Arc<Self>,
        stream: TcpStream,
        addr: NetAddr,
        direction: Direction,
        expected_id: Option<PeerId>,
    ) -> Result<PeerId, ProtocolError> {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let mut io = HandshakeIo::new(read_half, write_half);
        let timeout = self.config.handshake_timeout;

        let nonce: [u8; 8] = rand::random();
        let payload = HandshakePayload {
            node_id: self.identity.peer_id,
            chain_id: self.identity.chain_id.clone(),
            genesis_hash: self.identity.genesis_hash,
            version: self.identity.protocol_version,
            best_height: self.local_height(),
        };
        let signed = SignedHandshake::sign(&self.identity, payload, nonce)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let bytes = signed.encode().map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        io.write_envelope(MessageEnvelope::new(MessageType::Handshake, bytes), timeout).await?;

        let their_frame = io.read_envelope(timeout).await?;
        if their_frame.msg_type != MessageType::Handshake.as_u16() {
            return Err(ProtocolError::Malformed("expected a handshake frame first".to_string()));
        }
        let their_signed =
            SignedHandshake::decode(&their_frame.payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let mut reject = if their_signed.verify() { None } else { Some(RejectReason::BadSignature) };
        if reject.is_none() {
            if let Some(expected) = expected_id {
                if their_signed.payload.node_id != expected {
                    reject = Some(RejectReason::InvalidNodeId);
                }
            }
        }
        if reject.is_none() {
            reject = verify_handshake(&self.identity, &their_signed.payload).err();
        }
        let peer_id = their_signed.payload.node_id;

        if reject.is_none() && direction == Direction::Inbound {
            let unconditional = self.peer_manager().is_unconditional(&peer_id);
            match self.peer_manager().accept_inbound(peer_id, addr, unconditional) {
                Ok(AcceptResult::Rejected) => reject = Some(RejectReason::InvalidNodeId),
                Ok(_) => {}
                Err(_) => reject = Some(RejectReason::InvalidNodeId),
            }
        }

        let accepted = reject.is_none();
        let reason = reject.map(|r| r.as_str().to_string()).unwrap_or_default();
        let ack = HandshakeAckPayload { accepted, node_id: self.identity.peer_id, reason: reason.clone() };
        let ack_bytes = ack.encode().map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        io.write_envelope(MessageEnvelope::new(MessageType::HandshakeAck, ack_bytes), timeout).await?;

        if !accepted {
            return Err(ProtocolError::HandshakeRejected(reason));
        }

        let their_ack_frame = io.read_envelope(timeout).await?;
        if their_ack_frame.msg_type != MessageType::HandshakeAck.as_u16() {
            return Err(ProtocolError::Malformed("expected a handshake ack frame".to_string()));
        }
        let their_ack =
            HandshakeAckPayload::decode(&their_ack_frame.payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if !their_ack.accepted {
            return Err(ProtocolError::HandshakeRejected(their_ack.reason));
        }

        self.register_connection(peer_id, addr, direction, io);
        Ok(peer_id)
    }

    fn register_connection(self: &Arc<Self>, id: PeerId, addr: NetAddr, direction: Direction, io: HandshakeIo) {
        let HandshakeIo { read_half, write_half, framer, pending } = io;
        let (tx, rx) = mpsc::channel(256);
        let handle = PeerHandle::new(id, addr, direction, tx);
        let limiters = PeerRateLimiters::new(&self.config);
        tokio::spawn(run_writer(write_half, rx, self.config.write_timeout));

        let engine = Arc::clone(self);
        let read_task = tokio::spawn(async move {
            engine.run_read_loop(id, read_half, framer, pending).await;
        });

        let entry = Arc::new(ConnectionEntry {
            handle,
            connected_at: now_from_system_clock(),
            ping: Mutex::new(PingState::new()),
            limiters,
            consecutive_rate_violations: std::sync::atomic::AtomicU32::new(0),
            reader_task: read_task.abort_handle(),
        });
        self.connections.write().insert(id, entry);
    }

    async fn run_read_loop(self: Arc<Self>, id: PeerId, mut read_half: OwnedReadHalf, mut framer: FrameReader, leftover: VecDeque<MessageEnvelope>) {
        for envelope in leftover {
            self.handle_envelope(id, envelope);
        }
        let mut buf = [0u8; 8192];
        loop {
            let read = tokio::time::timeout(self.config.read_timeout, read_half.read(&mut buf)).await;
            let n = match read {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::debug!(peer = %id, error = %e, "read failed, closing connection");
                    break;
                }
                Err(_) => {
                    tracing::debug!(peer = %id, "idle read timeout, closing connection");
                    break;
                }
            };
            framer.feed(&buf[..n]);
            match framer.drain() {
                Ok(frames) => {
                    for envelope in frames {
                        self.handle_envelope(id, envelope);
                    }
                }
                Err(e) => {
                    tracing::debug!(peer = %id, error = %e, "framing error, closing connection");
                    break;
                }
            }
        }
        self.finish_connection(id);
    }

    fn finish_connection(&self, id: PeerId) {
        self.connections.write().remove(&id);
        if let Some(pm) = self.peer_manager.get() {
            pm.disconnect(&id);
        }
    }

    fn handle_envelope(&self, peer: PeerId, envelope: MessageEnvelope) {
        let now = now_from_system_clock();
        let Some(msg_type) = MessageType::from_u16(envelope.msg_type) else {
            p2p_telemetry::MESSAGES_DROPPED.inc();
            self.reputation.record_event(peer, now, PeerEventKind::Malformed);
            return;
        };

        let Some(conn) = self.connections.read().get(&peer).cloned() else {
            return;
        };
        let class = msg_type.gossip_class();
        if conn.limiters.check(class, envelope.payload.len() as u64).is_err() {
            p2p_telemetry::MESSAGES_DROPPED.inc();
            self.reputation.record_event(peer, now, PeerEventKind::Spam);
            let violations = conn.consecutive_rate_violations.fetch_add(1, Ordering::SeqCst) + 1;
            if violations >= RATE_LIMIT_BAN_THRESHOLD {
                self.reputation.apply_temp_ban(peer, now, "sustained rate-limit violations");
                self.disconnect(peer);
            }
            return;
        }
        conn.consecutive_rate_violations.store(0, Ordering::SeqCst);
        p2p_telemetry::MESSAGES_RECEIVED.inc();

        match msg_type {
            MessageType::Ping => {
                if let Some(nonce) = decode_nonce(&envelope.payload) {
                    let _ = self.send_to(peer, MessageType::Pong, encode_nonce(nonce));
                }
            }
            MessageType::Pong => {
                if let Some(nonce) = decode_nonce(&envelope.payload) {
                    conn.ping.lock().resolve(nonce);
                }
            }
            MessageType::PeerExchange => match pex::decode(&envelope.payload) {
                Ok(entries) => {
                    for entry in entries {
                        let _ = self.addrbook.add(entry.id, entry.addr, PeerSource::Pex, &conn.handle.addr, now);
                    }
                }
                Err(_) => {
                    self.reputation.record_event(peer, now, PeerEventKind::Malformed);
                }
            },
            MessageType::Handshake | MessageType::HandshakeAck => {
                self.reputation.record_event(peer, now, PeerEventKind::ProtocolViolation);
                self.disconnect(peer);
            }
            _ => {
                if let Some(class) = class {
                    let fp = fingerprint(&envelope.payload);
                    if !self.dedup.observe(fp, peer) {
                        p2p_telemetry::GOSSIP_DEDUP_HITS.inc();
                        // A duplicate delivery still proves this peer relayed a
                        // message that passed framing/rate-limit/type checks, so
                        // it still earns reputation credit even though the
                        // handler only runs once per fingerprint.
                        self.reputation.record_event(peer, now, PeerEventKind::ValidMessage);
                        return;
                    }
                }
                match self.handlers.dispatch(msg_type, peer, &envelope.payload) {
                    Ok(true) => self.reputation.record_event(peer, now, PeerEventKind::ValidMessage),
                    Ok(false) => tracing::debug!(peer = %peer, msg_type = ?msg_type, "no handler registered, dropping"),
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "handler rejected message");
                        self.reputation.record_event(peer, now, PeerEventKind::ProtocolViolation);
                        self.disconnect(peer);
                    }
                }
            }
        }
    }

    fn run_ping_tick(&self) {
        let now = now_from_system_clock();
        let snapshot: Vec<(PeerId, bool, bool)> = self
            .connections
            .read()
            .values()
            .map(|c| {
                let ping = c.ping.lock();
                (c.handle.id, ping.is_overdue(now, self.config.ping_timeout.as_secs()), ping.has_outstanding())
            })
            .collect();
        for (id, overdue, has_outstanding) in snapshot {
            if overdue {
                self.reputation.record_event(id, now, PeerEventKind::ProtocolViolation);
                self.disconnect(id);
                continue;
            }
            if has_outstanding {
                continue;
            }
            let nonce: u64 = rand::random();
            if let Some(conn) = self.connections.read().get(&id) {
                conn.ping.lock().send(nonce, now);
            }
            let _ = self.send_to(id, MessageType::Ping, encode_nonce(nonce));
        }
    }

    fn run_pex_tick(&self) {
        let sample = self.addrbook.select_for_pex(16);
        if sample.is_empty() {
            return;
        }
        let entries: Vec<PexEntry> = sample.into_iter().map(|a| PexEntry { id: a.id, addr: a.addr }).collect();
        self.broadcast(MessageType::PeerExchange, pex::encode(&entries));
    }

    /// Accepts inbound TCP connections on `bind_addr` until `cancel` fires.
    /// Each accepted socket runs its handshake on its own task so a slow or
    /// hostile peer during the handshake window never blocks new accepts.
    pub async fn run_listener(self: Arc<Self>, bind_addr: SocketAddr, cancel: CancellationToken) {
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                let _ = self.health_tx.try_send(HealthEvent::issue("protocol-engine", format!("listen failed: {e}")));
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::debug!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let net_addr = to_net_addr(peer_addr);
                    let engine = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = engine.handshake_and_register(stream, net_addr, Direction::Inbound, None).await {
                            tracing::debug!(addr = %peer_addr, error = %e, "inbound handshake failed");
                        }
                    });
                }
            }
        }
    }

    /// Drives ping liveness, peer exchange and dedup-set GC on their
    /// configured intervals until `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ping_ticker = tokio::time::interval(self.config.ping_interval);
            let mut pex_ticker = tokio::time::interval(self.config.pex_interval);
            let mut dedup_ticker = tokio::time::interval(self.config.dedup_ttl.max(Duration::from_millis(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ping_ticker.tick() => self.run_ping_tick(),
                    _ = pex_ticker.tick() => self.run_pex_tick(),
                    _ = dedup_ticker.tick() => self.dedup.sweep(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use ed25519_dalek::SigningKey;
    use p2p_addrbook::AddressBookConfig;
    use p2p_peer_manager::PeerManagerConfig;
    use p2p_reputation::ReputationConfig;
    use p2p_types::MessageType;

    use crate::dialer::{to_net_addr, TcpDialer};

    fn build_identity(seed: u8, chain_id: &str) -> NodeIdentity {
        let mut bytes = [0u8; 32];
        bytes[0] = seed;
        let key = SigningKey::from_bytes(&bytes);
        NodeIdentity::new(key, chain_id.to_string(), [7; 32], 1 << 16)
    }

    fn build_engine(seed: u8, chain_id: &str) -> (Arc<ProtocolEngine>, Arc<PeerManager>) {
        let identity = build_identity(seed, chain_id);
        let (rep_tx, _rep_rx) = mpsc::channel(8);
        let reputation = ReputationManager::new(ReputationConfig::for_testing(), PathBuf::from("/tmp/unused"), rep_tx);
        let (ab_tx, _ab_rx) = mpsc::channel(8);
        let addrbook =
            AddressBookManager::new(AddressBookConfig::for_testing(), identity.peer_id, PathBuf::from("/tmp/unused"), ab_tx);
        let (health_tx, _health_rx) = mpsc::channel(8);
        let engine =
            ProtocolEngine::new(identity, ProtocolConfig::for_testing(), Arc::clone(&reputation), Arc::clone(&addrbook), health_tx);

        let dialer = Arc::new(TcpDialer::new(Arc::clone(&engine)));
        let (pm_health_tx, _pm_health_rx) = mpsc::channel(8);
        let (peer_manager, _pm_events_rx) = PeerManager::new(PeerManagerConfig::for_testing(), reputation, addrbook, dialer, pm_health_tx);
        engine.set_peer_manager(Arc::clone(&peer_manager));
        (engine, peer_manager)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn outbound_dial_completes_handshake_and_delivers_a_message() {
        let (engine_a, peer_manager_a) = build_engine(1, "cosmos-core-1");
        let (engine_b, _peer_manager_b) = build_engine(2, "cosmos-core-1");

        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<Vec<u8>>();
        let done_tx = Mutex::new(Some(done_tx));
        engine_b.register_handler(
            MessageType::Tx,
            Arc::new(move |_peer: PeerId, payload: &[u8]| {
                if let Some(tx) = done_tx.lock().take() {
                    let _ = tx.send(payload.to_vec());
                }
                Ok(())
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bound_addr = to_net_addr(listener.local_addr().unwrap());
        let accept_task = {
            let engine_b = Arc::clone(&engine_b);
            tokio::spawn(async move {
                let (stream, peer_addr) = listener.accept().await.unwrap();
                engine_b.handshake_and_register(stream, to_net_addr(peer_addr), Direction::Inbound, None).await
            })
        };

        let dial_id = engine_b.identity().peer_id;
        peer_manager_a.connect(dial_id, bound_addr, true).await.expect("outbound dial succeeds");
        accept_task.await.unwrap().expect("inbound handshake succeeds");

        assert!(engine_a.is_connected(&dial_id));
        assert_eq!(engine_b.peer_count(), 1);

        engine_a.send_to(dial_id, MessageType::Tx, vec![9, 9, 9]).unwrap();
        let received = tokio::time::timeout(Duration::from_secs(2), done_rx).await.unwrap().unwrap();
        assert_eq!(received, vec![9, 9, 9]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn mismatched_chain_id_is_rejected_at_the_engine_level() {
        let (_engine_a, peer_manager_a) = build_engine(3, "cosmos-core-1");
        let (engine_b, _peer_manager_b) = build_engine(4, "cosmos-core-2");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bound_addr = to_net_addr(listener.local_addr().unwrap());
        let accept_task = {
            let engine_b = Arc::clone(&engine_b);
            tokio::spawn(async move {
                let (stream, peer_addr) = listener.accept().await.unwrap();
                engine_b.handshake_and_register(stream, to_net_addr(peer_addr), Direction::Inbound, None).await
            })
        };

        let dial_id = engine_b.identity().peer_id;
        let outcome = peer_manager_a.connect(dial_id, bound_addr, true).await;
        assert!(outcome.is_err());
        assert!(accept_task.await.unwrap().is_err());
        assert_eq!(engine_b.peer_count(), 0);
    }

    /// Connects `dialer`'s peer manager to `listener_engine` over a fresh
    /// loopback listener, returning once the inbound handshake lands.
    async fn connect_inbound(
        dialer_peer_manager: &Arc<PeerManager>,
        listener_engine: &Arc<ProtocolEngine>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bound_addr = to_net_addr(listener.local_addr().unwrap());
        let accept_task = {
            let listener_engine = Arc::clone(listener_engine);
            tokio::spawn(async move {
                let (stream, peer_addr) = listener.accept().await.unwrap();
                listener_engine.handshake_and_register(stream, to_net_addr(peer_addr), Direction::Inbound, None).await
            })
        };
        let dial_id = listener_engine.identity().peer_id;
        dialer_peer_manager.connect(dial_id, bound_addr, true).await.expect("outbound dial succeeds");
        accept_task.await.unwrap().expect("inbound handshake succeeds");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_gossip_delivery_credits_each_relaying_peer_independently() {
        let (engine_a, peer_manager_a) = build_engine(5, "cosmos-core-1");
        let (engine_c, peer_manager_c) = build_engine(7, "cosmos-core-1");
        let (engine_b, _peer_manager_b) = build_engine(6, "cosmos-core-1");
        engine_b.register_handler(MessageType::Tx, Arc::new(|_peer: PeerId, _payload: &[u8]| Ok(())));

        connect_inbound(&peer_manager_a, &engine_b).await;
        connect_inbound(&peer_manager_c, &engine_b).await;

        let sender_a = engine_a.identity().peer_id;
        let sender_c = engine_c.identity().peer_id;
        let payload = vec![4, 2, 4, 2];

        // Two distinct peers relay the identical payload (same dedup
        // fingerprint) within the same window. The handler only runs
        // once, but both relayers independently proved they forwarded a
        // valid message and both earn credit in their own record.
        engine_b.handle_envelope(sender_a, MessageEnvelope::new(MessageType::Tx, payload.clone()));
        engine_b.handle_envelope(sender_c, MessageEnvelope::new(MessageType::Tx, payload));

        let snapshot = engine_b.reputation.snapshot();
        assert_eq!(snapshot.get(&sender_a).expect("a has a record").counters.valid_msgs, 1);
        assert_eq!(snapshot.get(&sender_c).expect("c has a record").counters.valid_msgs, 1);
    }
}
