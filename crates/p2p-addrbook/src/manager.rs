use std::path::PathBuf;
use std::sync::Arc;

use p2p_types::{HealthEvent, NetAddr, PeerAddress, PeerId, PeerSource, Timestamp};
use parking_lot::RwLock;
use rand::thread_rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::book::{AddressBook, AddressBookStats};
use crate::config::AddressBookConfig;
use crate::errors::AddressBookError;
use crate::persistence;

/// Owns the address book's lock and disk lifecycle. The book itself stays
/// synchronous and lock-free internally; this wraps it for concurrent
/// access from dialers, PEX, and the autosave loop.
pub struct AddressBookManager {
    book: RwLock<AddressBook>,
    data_dir: PathBuf,
    health_tx: mpsc::Sender<HealthEvent>,
    autosave_interval: std::time::Duration,
}

impl AddressBookManager {
    pub fn new(
        config: AddressBookConfig,
        self_id: PeerId,
        data_dir: PathBuf,
        health_tx: mpsc::Sender<HealthEvent>,
    ) -> Arc<Self> {
        let autosave_interval = config.autosave_interval;
        Arc::new(Self {
            book: RwLock::new(AddressBook::new(config, self_id)),
            data_dir,
            health_tx,
            autosave_interval,
        })
    }

    /// Loads `data_dir/addrbook.json`. A missing or corrupt file is never
    /// fatal: this starts with an empty book and logs a warning.
    pub async fn load(&self) {
        let path = persistence::book_path(&self.data_dir);
        match persistence::load(&path).await {
            Ok(entries) => {
                let mut book = self.book.write();
                for entry in entries {
                    let source_addr = entry.addr;
                    let was_tried = matches!(entry.bucket, p2p_types::Bucket::Tried);
                    let id = entry.id;
                    let addr = entry.addr;
                    let source = entry.source;
                    let first_seen = entry.first_seen;
                    if book.add(id, addr, source, &source_addr, first_seen).unwrap_or(false)
                        && was_tried
                    {
                        book.promote(&id, entry.last_seen);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load address book, starting empty");
            }
        }
    }

    pub fn add(
        &self,
        id: PeerId,
        addr: NetAddr,
        source: PeerSource,
        source_addr: &NetAddr,
        now: Timestamp,
    ) -> Result<bool, AddressBookError> {
        self.book.write().add(id, addr, source, source_addr, now)
    }

    pub fn mark_attempt(&self, id: &PeerId, now: Timestamp) {
        self.book.write().mark_attempt(id, now);
    }

    pub fn promote(&self, id: &PeerId, now: Timestamp) -> bool {
        self.book.write().promote(id, now)
    }

    pub fn remove(&self, id: &PeerId) -> bool {
        self.book.write().remove(id)
    }

    pub fn get_address(&self, id: &PeerId) -> Option<PeerAddress> {
        self.book.read().get_address(id).cloned()
    }

    pub fn size(&self) -> usize {
        self.book.read().size()
    }

    pub fn stats(&self) -> AddressBookStats {
        self.book.read().stats()
    }

    pub fn select_peers(&self, k: usize) -> Vec<PeerAddress> {
        self.book.read().select_peers(k, &mut thread_rng())
    }

    pub fn select_for_pex(&self, k: usize) -> Vec<PeerAddress> {
        self.book.read().select_for_pex(k, &mut thread_rng())
    }

    pub async fn flush(&self) {
        let entries: Vec<PeerAddress> = self.book.read().all_entries().cloned().collect();
        let path = persistence::book_path(&self.data_dir);
        if let Err(e) = persistence::save(&path, entries).await {
            tracing::warn!(error = %e, "address book flush failed");
            let _ = self
                .health_tx
                .try_send(HealthEvent::issue("addrbook", e.to_string()));
        }
    }

    /// Starts the autosave loop. Performs a final save before returning on
    /// cancellation so a graceful shutdown never loses recent discoveries.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.autosave_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.flush().await;
                        break;
                    }
                    _ = ticker.tick() => {
                        self.flush().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_types::IpAddr;

    fn net(a: u8, b: u8, c: u8, d: u8) -> NetAddr {
        NetAddr::new(IpAddr::v4(a, b, c, d), 9000)
    }

    #[tokio::test]
    async fn load_then_flush_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let mgr = AddressBookManager::new(
            AddressBookConfig::for_testing(),
            PeerId::new([0; 32]),
            dir.path().to_path_buf(),
            tx.clone(),
        );
        let id = PeerId::new([1; 32]);
        mgr.add(id, net(1, 2, 3, 4), PeerSource::Seed, &net(8, 8, 8, 8), Timestamp::new(0))
            .unwrap();
        mgr.flush().await;

        let reloaded = AddressBookManager::new(
            AddressBookConfig::for_testing(),
            PeerId::new([0; 32]),
            dir.path().to_path_buf(),
            tx,
        );
        reloaded.load().await;
        assert_eq!(reloaded.size(), 1);
    }
}
