use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use p2p_types::{HealthEvent, NetAddr, PeerId, Timestamp};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::admission::{self, AdmissionTracker, DiverseCandidate};
use crate::ban::{self, BanOutcome};
use crate::config::ReputationConfig;
use crate::errors::ReputationError;
use crate::persistence;
use crate::record::{PeerEventKind, PeerRecord};
use crate::score;

type RecordHandle = Arc<Mutex<PeerRecord>>;

/// Authoritative scorer and admission gate for observed peers. Owns no
/// sockets and never initiates network I/O; components report events and
/// consult [`ReputationManager::should_accept`] before admitting or keeping
/// a connection.
pub struct ReputationManager {
    records: RwLock<HashMap<PeerId, RecordHandle>>,
    admission: Mutex<AdmissionTracker>,
    config: ReputationConfig,
    data_dir: PathBuf,
    health_tx: mpsc::Sender<HealthEvent>,
}

impl ReputationManager {
    pub fn new(config: ReputationConfig, data_dir: PathBuf, health_tx: mpsc::Sender<HealthEvent>) -> Arc<Self> {
        Arc::new(Self {
            records: RwLock::new(HashMap::new()),
            admission: Mutex::new(AdmissionTracker::new()),
            config,
            data_dir,
            health_tx,
        })
    }

    /// Loads `data_dir/reputation/peers.json`. A missing or corrupt file is
    /// never fatal: this starts with an empty table and logs a warning, per
    /// the component's failure semantics.
    pub async fn load(&self) {
        let path = persistence::peers_path(&self.data_dir);
        match persistence::load_peers(&path).await {
            Ok(loaded) => {
                let mut records = self.records.write();
                for (id, record) in loaded {
                    records.insert(id, Arc::new(Mutex::new(record)));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load reputation snapshot, starting empty");
            }
        }
    }

    fn get_or_create(&self, id: PeerId, address: Option<NetAddr>, now: Timestamp) -> RecordHandle {
        if let Some(handle) = self.records.read().get(&id) {
            return handle.clone();
        }
        let mut records = self.records.write();
        records
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(PeerRecord::new(id, address, now))))
            .clone()
    }

    pub fn on_connected(&self, id: PeerId, addr: NetAddr, asn: Option<u32>, now: Timestamp) {
        let handle = self.get_or_create(id, Some(addr), now);
        handle.lock().on_connected(now);
        self.admission.lock().on_connected(&addr, asn);
    }

    pub fn on_disconnected(&self, id: PeerId, addr: NetAddr, asn: Option<u32>, now: Timestamp) {
        if let Some(handle) = self.records.read().get(&id) {
            handle.lock().on_disconnected(now);
        }
        self.admission.lock().on_disconnected(&addr, asn);
    }

    /// Records an observed event and recomputes the peer's score.
    /// `DoubleSign` bans permanently on the spot; everything else only
    /// feeds the windowed violations sub-score. Callers that detect a
    /// sustained pattern of misbehavior escalate separately via
    /// [`ReputationManager::apply_temp_ban`].
    pub fn record_event(&self, id: PeerId, now: Timestamp, kind: PeerEventKind) {
        let handle = self.get_or_create(id, None, now);
        let mut record = handle.lock();
        record.apply_event(now, kind);
        if kind.triggers_immediate_permanent_ban() {
            ban::ban_permanently(&mut record, "double sign");
        }
        score::recompute(&mut record, now, &self.config);
    }

    pub fn observe_latency_ms(&self, id: PeerId, latency_ms: u64) {
        if let Some(handle) = self.records.read().get(&id) {
            handle.lock().observe_latency_ms(latency_ms);
        }
    }

    /// Advances the temporary-ban ladder for a peer that a calling
    /// component has determined committed a ban-worthy offense (e.g. three
    /// consecutive rate-limit windows exceeded).
    pub fn apply_temp_ban(&self, id: PeerId, now: Timestamp, reason: impl Into<String>) -> BanOutcome {
        let handle = self.get_or_create(id, None, now);
        let mut record = handle.lock();
        ban::ban_temporarily(&mut record, now, reason, &self.config)
    }

    pub fn is_whitelisted(&self, id: &PeerId) -> bool {
        self.records
            .read()
            .get(id)
            .map(|h| h.lock().whitelisted)
            .unwrap_or(false)
    }

    /// Bans a peer permanently at a calling component's request (e.g. a
    /// protocol-level decision outside the automatic `DoubleSign` trigger
    /// in [`ReputationManager::record_event`]).
    pub fn ban_permanently(&self, id: PeerId, now: Timestamp, reason: impl Into<String>) {
        let handle = self.get_or_create(id, None, now);
        let mut record = handle.lock();
        ban::ban_permanently(&mut record, reason);
        score::recompute(&mut record, now, &self.config);
    }

    pub fn whitelist(&self, id: PeerId, now: Timestamp) -> Result<(), ReputationError> {
        let handle = self.get_or_create(id, None, now);
        let mut record = handle.lock();
        if record.whitelisted {
            return Err(ReputationError::AlreadyWhitelisted);
        }
        record.whitelisted = true;
        ban::clear_ban(&mut record);
        score::recompute(&mut record, now, &self.config);
        Ok(())
    }

    pub fn should_accept(
        &self,
        id: Option<PeerId>,
        addr: &NetAddr,
        asn: Option<u32>,
        now: Timestamp,
    ) -> (bool, String) {
        let handle = id.and_then(|id| self.records.read().get(&id).cloned());
        let guard = handle.as_ref().map(|h| h.lock());
        let record_ref = guard.as_deref();
        let mut tracker = self.admission.lock();
        admission::should_accept(record_ref, addr, asn, now, &mut tracker, &self.config)
    }

    pub fn select_diverse_peers(&self, k: usize) -> Vec<PeerId> {
        let records = self.records.read();
        let candidates: Vec<DiverseCandidate> = records
            .values()
            .map(|handle| {
                let record = handle.lock();
                DiverseCandidate {
                    id: record.id,
                    country: record.country.clone(),
                    score: record.score.value(),
                }
            })
            .collect();
        admission::select_diverse_peers(candidates, k, &self.config)
    }

    pub fn score_of(&self, id: &PeerId) -> Option<f64> {
        self.records.read().get(id).map(|h| h.lock().score.value())
    }

    pub fn decay_all(&self, now: Timestamp) {
        let records = self.records.read();
        for handle in records.values() {
            let mut record = handle.lock();
            score::decay(&mut record, now, &self.config);
        }
    }

    pub fn snapshot(&self) -> HashMap<PeerId, PeerRecord> {
        self.records
            .read()
            .iter()
            .map(|(id, handle)| (*id, handle.lock().clone()))
            .collect()
    }

    pub async fn flush(&self) {
        let snapshot = self.snapshot();
        let peers_path = persistence::peers_path(&self.data_dir);
        if let Err(e) = persistence::save_peers(&peers_path, &snapshot).await {
            tracing::warn!(error = %e, "reputation flush failed");
            let _ = self
                .health_tx
                .try_send(HealthEvent::issue("reputation", e.to_string()));
            return;
        }
        let bans_path = persistence::bans_path(&self.data_dir);
        if let Err(e) = persistence::save_bans(&bans_path, &snapshot).await {
            tracing::warn!(error = %e, "ban snapshot flush failed");
            let _ = self
                .health_tx
                .try_send(HealthEvent::issue("reputation", e.to_string()));
        }
    }

    /// Starts the decay and write-behind flush loops. Both observe
    /// `cancel` and perform a final flush before returning, so a graceful
    /// shutdown never loses the last interval's worth of scoring.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut decay_ticker = tokio::time::interval(self.config.decay_interval);
            let mut flush_ticker = tokio::time::interval(self.config.flush_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.flush().await;
                        break;
                    }
                    _ = decay_ticker.tick() => {
                        self.decay_all(now_from_system_clock());
                    }
                    _ = flush_ticker.tick() => {
                        self.flush().await;
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
    use p2p_types::IpAddr;

    fn addr(d: u8) -> NetAddr {
        NetAddr::new(IpAddr::v4(10, 1, 2, d), 9000)
    }

    fn manager() -> Arc<ReputationManager> {
        let (tx, _rx) = mpsc::channel(8);
        ReputationManager::new(
            ReputationConfig::for_testing(),
            PathBuf::from("/tmp/does-not-matter"),
            tx,
        )
    }

    #[test]
    fn permanently_banned_peer_never_accepted() {
        let mgr = manager();
        let id = PeerId::new([1; 32]);
        mgr.record_event(id, Timestamp::new(0), PeerEventKind::DoubleSign);
        let (allowed, reason) = mgr.should_accept(Some(id), &addr(5), None, Timestamp::new(1));
        assert!(!allowed);
        assert_eq!(reason, "permanently banned");
    }

    #[test]
    fn temp_ban_escalation_to_permanent_denies_future_accept() {
        let mgr = manager();
        let id = PeerId::new([2; 32]);
        mgr.apply_temp_ban(id, Timestamp::new(0), "invalid");
        mgr.apply_temp_ban(id, Timestamp::new(1), "invalid");
        mgr.apply_temp_ban(id, Timestamp::new(2), "invalid");
        mgr.apply_temp_ban(id, Timestamp::new(3), "invalid");
        let (allowed, reason) = mgr.should_accept(Some(id), &addr(9), None, Timestamp::new(4));
        assert!(!allowed);
        assert_eq!(reason, "permanently banned");
    }

    #[test]
    fn whitelisting_clears_existing_ban() {
        let mgr = manager();
        let id = PeerId::new([3; 32]);
        mgr.apply_temp_ban(id, Timestamp::new(0), "invalid");
        mgr.whitelist(id, Timestamp::new(1)).unwrap();
        let (allowed, _) = mgr.should_accept(Some(id), &addr(1), None, Timestamp::new(2));
        assert!(allowed);
    }

    #[test]
    fn double_whitelist_errors() {
        let mgr = manager();
        let id = PeerId::new([4; 32]);
        mgr.whitelist(id, Timestamp::new(0)).unwrap();
        assert!(matches!(
            mgr.whitelist(id, Timestamp::new(1)),
            Err(ReputationError::AlreadyWhitelisted)
        ));
    }
}
