use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use p2p_addrbook::AddressBookManager;
use p2p_reputation::ReputationManager;
use p2p_types::{Direction, HealthEvent, NetAddr, PeerId, Timestamp};
use parking_lot::Mutex;
use rand::thread_rng;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::backoff::ReconnectBackoff;
use crate::config::PeerManagerConfig;
use crate::dialer::Dialer;
use crate::errors::PeerManagerError;
use crate::events::PeerManagerEvent;
use crate::slots::{AcceptResult, ConnectionSlots, SlotStats};

/// Connection lifecycle owner: enforces inbound/outbound caps, runs the
/// bounded dial pipeline, tracks reconnect backoff for persistent peers,
/// and evicts low-scored inbound connections under pressure. Consults
/// [`ReputationManager`] for admission and [`AddressBookManager`] for
/// dial candidates and attempt bookkeeping; never opens a socket itself —
/// that is the injected [`Dialer`]'s job.
pub struct PeerManager {
    slots: Mutex<ConnectionSlots>,
    config: PeerManagerConfig,
    reputation: Arc<ReputationManager>,
    addrbook: Arc<AddressBookManager>,
    dialer: Arc<dyn Dialer>,
    dial_semaphore: Semaphore,
    backoffs: Mutex<HashMap<PeerId, ReconnectBackoff>>,
    persistent: Mutex<HashSet<PeerId>>,
    unconditional: Mutex<HashSet<PeerId>>,
    next_redial_at: Mutex<HashMap<PeerId, Timestamp>>,
    events_tx: mpsc::Sender<PeerManagerEvent>,
    health_tx: mpsc::Sender<HealthEvent>,
}

impl PeerManager {
    pub fn new(
        config: PeerManagerConfig,
        reputation: Arc<ReputationManager>,
        addrbook: Arc<AddressBookManager>,
        dialer: Arc<dyn Dialer>,
        health_tx: mpsc::Sender<HealthEvent>,
    ) -> (Arc<Self>, mpsc::Receiver<PeerManagerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let dial_concurrency = config.dial_concurrency;
        let manager = Arc::new(Self {
            slots: Mutex::new(ConnectionSlots::new()),
            config,
            reputation,
            addrbook,
            dialer,
            dial_semaphore: Semaphore::new(dial_concurrency),
            backoffs: Mutex::new(HashMap::new()),
            persistent: Mutex::new(HashSet::new()),
            unconditional: Mutex::new(HashSet::new()),
            next_redial_at: Mutex::new(HashMap::new()),
            events_tx,
            health_tx,
        });
        (manager, events_rx)
    }

    pub fn add_persistent(&self, id: PeerId) {
        self.persistent.lock().insert(id);
    }

    /// Marks `id` as unconditional: both outbound dials and inbound accepts
    /// from this peer bypass slot-availability checks.
    pub fn add_unconditional(&self, id: PeerId) {
        self.unconditional.lock().insert(id);
    }

    pub fn is_unconditional(&self, id: &PeerId) -> bool {
        self.unconditional.lock().contains(id)
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.slots.lock().connected_peers()
    }

    pub fn stats(&self) -> SlotStats {
        self.slots.lock().stats(&self.config)
    }

    /// Dials `addr` through the bounded pipeline. Waits for a free dial
    /// slot, consults admission policy, then delegates the transport-level
    /// handshake to the injected [`Dialer`].
    pub async fn connect(&self, id: PeerId, addr: NetAddr, unconditional: bool) -> Result<(), PeerManagerError> {
        if self.slots.lock().is_connected(&id) {
            return Err(PeerManagerError::DuplicateDial);
        }
        if !unconditional && !self.slots.lock().has_outbound_slot(&self.config) {
            return Err(PeerManagerError::NoSlotsAvailable);
        }

        let now = now_from_system_clock();
        let (allowed, reason) = self.reputation.should_accept(Some(id), &addr, None, now);
        if !allowed {
            return Err(PeerManagerError::Denied(reason));
        }

        let _permit = self.dial_semaphore.acquire().await.map_err(|_| {
            let _ = self
                .health_tx
                .try_send(HealthEvent::issue("peer-manager", "dial pipeline closed"));
            PeerManagerError::Io("dial pipeline closed".to_string())
        })?;

        match self.dialer.dial(id, addr).await {
            Ok(()) => {
                self.on_dial_success(id, addr, unconditional, now);
                Ok(())
            }
            Err(e) => {
                self.on_dial_failure(id, addr, now);
                Err(e)
            }
        }
    }

    fn on_dial_success(&self, id: PeerId, addr: NetAddr, unconditional: bool, now: Timestamp) {
        self.slots.lock().reserve_outbound(id, addr, now, unconditional, &self.config);
        self.reputation.on_connected(id, addr, None, now);
        self.addrbook.promote(&id, now);
        self.backoffs.lock().entry(id).or_default().record_success();
        let _ = self.events_tx.try_send(PeerManagerEvent::Connected { id, addr, direction: Direction::Outbound });
    }

    fn on_dial_failure(&self, id: PeerId, addr: NetAddr, now: Timestamp) {
        self.addrbook.mark_attempt(&id, now);
        self.backoffs.lock().entry(id).or_default().record_failure();
        let _ = self.events_tx.try_send(PeerManagerEvent::DialFailed { id, addr });
    }

    /// Admits or rejects an inbound connection that has already completed
    /// the transport handshake; the caller (protocol engine) owns the
    /// socket itself.
    pub fn accept_inbound(&self, id: PeerId, addr: NetAddr, unconditional: bool) -> Result<AcceptResult, PeerManagerError> {
        let now = now_from_system_clock();
        let (allowed, reason) = self.reputation.should_accept(Some(id), &addr, None, now);
        if !allowed {
            return Err(PeerManagerError::Denied(reason));
        }

        let score = self.reputation.score_of(&id).unwrap_or(0.0);
        let reputation = &self.reputation;
        let (result, evicted) = self.slots.lock().try_accept_inbound(
            id,
            addr,
            now,
            unconditional,
            score,
            |pid| reputation.is_whitelisted(pid),
            &self.config,
        );

        match &result {
            AcceptResult::Accepted => {
                self.reputation.on_connected(id, addr, None, now);
                let _ = self.events_tx.try_send(PeerManagerEvent::Connected { id, addr, direction: Direction::Inbound });
            }
            AcceptResult::Evicted(victim_id) => {
                if let Some(victim) = evicted {
                    self.reputation.on_disconnected(victim.id, victim.remote_addr, None, now);
                }
                self.reputation.on_connected(id, addr, None, now);
                let _ = self.events_tx.try_send(PeerManagerEvent::Evicted { id: *victim_id });
                let _ = self.events_tx.try_send(PeerManagerEvent::Connected { id, addr, direction: Direction::Inbound });
            }
            AcceptResult::Rejected => {}
        }
        Ok(result)
    }

    pub fn disconnect(&self, id: &PeerId) {
        let conn = self.slots.lock().disconnect(id);
        if let Some(conn) = conn {
            self.reputation.on_disconnected(*id, conn.remote_addr, None, now_from_system_clock());
            let _ = self.events_tx.try_send(PeerManagerEvent::Disconnected { id: *id, addr: conn.remote_addr });
        }
    }

    /// Bans a peer permanently and drops its connection, if any.
    pub fn ban(&self, id: PeerId, reason: impl Into<String>) {
        self.reputation.ban_permanently(id, now_from_system_clock(), reason);
        self.disconnect(&id);
    }

    /// Disconnects idle connections and tops up outbound connections toward
    /// `min_outbound` by dialing addresses selected from the address book.
    /// Persistent peers that are not connected and whose backoff has
    /// elapsed are redialed regardless of the general outbound target.
    pub async fn run_maintenance(self: &Arc<Self>) {
        let now = now_from_system_clock();
        let idle: Vec<PeerId> = self.slots.lock().idle_peers(now, &self.config);
        for id in idle {
            self.disconnect(&id);
        }

        let outbound_count = self.slots.lock().outbound_count();
        if outbound_count < self.config.min_outbound {
            let want = self.config.min_outbound - outbound_count;
            let connected: HashSet<PeerId> = self.slots.lock().connected_peers().into_iter().collect();
            let candidates = self.addrbook.select_peers(want * 2);
            let mut dialed = 0;
            for candidate in candidates {
                if dialed >= want || connected.contains(&candidate.id) {
                    continue;
                }
                dialed += 1;
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = this.connect(candidate.id, candidate.addr, false).await {
                        tracing::debug!(peer = %candidate.id, error = %e, "maintenance dial failed");
                    }
                });
            }
        }

        let persistent: Vec<PeerId> = self.persistent.lock().iter().copied().collect();
        for id in persistent {
            if self.slots.lock().is_connected(&id) {
                continue;
            }
            let due = self
                .next_redial_at
                .lock()
                .get(&id)
                .map(|t| *t <= now)
                .unwrap_or(true);
            if !due {
                continue;
            }
            let Some(addr) = self.addrbook.get_address(&id).map(|a| a.addr) else {
                continue;
            };
            let delay = {
                let mut backoffs = self.backoffs.lock();
                backoffs.entry(id).or_default().next_delay(&self.config, &mut thread_rng())
            };
            self.next_redial_at.lock().insert(id, now.add_secs(delay.as_secs().max(1)));
            let this = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = this.connect(id, addr, true).await {
                    tracing::debug!(peer = %id, error = %e, "persistent redial failed");
                }
            });
        }
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.maintenance_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_maintenance().await;
                    }
                }
            }
        })
    }
}

fn now_from_system_clock() -> Timestamp {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Timestamp::new(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_addrbook::AddressBookConfig;
    use p2p_reputation::ReputationConfig;
    use p2p_types::IpAddr;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn addr(d: u8) -> NetAddr {
        NetAddr::new(IpAddr::v4(1, 2, 3, d), 9000)
    }

    struct AlwaysSucceeds;
    #[async_trait::async_trait]
    impl Dialer for AlwaysSucceeds {
        async fn dial(&self, _id: PeerId, _addr: NetAddr) -> Result<(), PeerManagerError> {
            Ok(())
        }
    }

    struct AlwaysFails;
    #[async_trait::async_trait]
    impl Dialer for AlwaysFails {
        async fn dial(&self, _id: PeerId, _addr: NetAddr) -> Result<(), PeerManagerError> {
            Err(PeerManagerError::Io("refused".to_string()))
        }
    }

    fn test_manager(dialer: Arc<dyn Dialer>) -> Arc<PeerManager> {
        let (rep_tx, _rep_rx) = mpsc::channel(8);
        let reputation = ReputationManager::new(
            ReputationConfig::for_testing(),
            PathBuf::from("/tmp/unused"),
            rep_tx,
        );
        let (ab_tx, _ab_rx) = mpsc::channel(8);
        let addrbook = AddressBookManager::new(
            AddressBookConfig::for_testing(),
            PeerId::new([0; 32]),
            PathBuf::from("/tmp/unused"),
            ab_tx,
        );
        let (pm_tx, _pm_rx) = mpsc::channel(8);
        let (manager, _events) = PeerManager::new(
            PeerManagerConfig::for_testing(),
            reputation,
            addrbook,
            dialer,
            pm_tx,
        );
        manager
    }

    #[tokio::test]
    async fn successful_dial_reserves_outbound_slot() {
        let manager = test_manager(Arc::new(AlwaysSucceeds));
        let id = PeerId::new([1; 32]);
        manager.connect(id, addr(1), false).await.unwrap();
        assert!(manager.peers().contains(&id));
    }

    #[tokio::test]
    async fn failed_dial_does_not_reserve_a_slot() {
        let manager = test_manager(Arc::new(AlwaysFails));
        let id = PeerId::new([2; 32]);
        assert!(manager.connect(id, addr(2), false).await.is_err());
        assert!(manager.peers().is_empty());
    }

    #[tokio::test]
    async fn unconditional_peers_are_queryable_after_registration() {
        let manager = test_manager(Arc::new(AlwaysSucceeds));
        let id = PeerId::new([9; 32]);
        assert!(!manager.is_unconditional(&id));
        manager.add_unconditional(id);
        assert!(manager.is_unconditional(&id));
    }

    #[tokio::test]
    async fn outbound_cap_is_enforced() {
        let manager = test_manager(Arc::new(AlwaysSucceeds));
        let config = PeerManagerConfig::for_testing();
        for i in 0..config.max_outbound as u8 {
            manager.connect(PeerId::new([i + 1; 32]), addr(i), false).await.unwrap();
        }
        let result = manager.connect(PeerId::new([250; 32]), addr(250), false).await;
        assert!(matches!(result, Err(PeerManagerError::NoSlotsAvailable)));
    }

    #[tokio::test]
    async fn dial_pipeline_bounds_concurrency() {
        struct CountingDialer {
            inflight: AtomicUsize,
            max_seen: AtomicUsize,
        }
        #[async_trait::async_trait]
        impl Dialer for CountingDialer {
            async fn dial(&self, _id: PeerId, _addr: NetAddr) -> Result<(), PeerManagerError> {
                let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                self.inflight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let dialer = Arc::new(CountingDialer { inflight: AtomicUsize::new(0), max_seen: AtomicUsize::new(0) });
        let manager = test_manager(dialer.clone());
        let config = PeerManagerConfig::for_testing();

        let mut handles = Vec::new();
        for i in 0..10u8 {
            let m = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                let _ = m.connect(PeerId::new([i + 1; 32]), addr(i), true).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(dialer.max_seen.load(Ordering::SeqCst) <= config.dial_concurrency);
    }
}
