//! Sync scheduler: requests contiguous block ranges from reliable peers
//! until the local chain catches up to the best observed height, delivers
//! them to the application strictly in ascending order, and scaffolds
//! snapshot transfer for far-behind nodes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use p2p_reputation::{PeerEventKind, ReputationManager};
use p2p_types::{HealthEvent, MessageType, PeerId, Timestamp};
use p2p_protocol::ProtocolEngine;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::reliability::ReliabilityTracker;
use crate::state::{InFlightRequest, SyncMode, SyncState};
use crate::wire::{
    BlockRequestPayload, BlockResponsePayload, SnapshotChunkPayload, SnapshotRequestPayload, StatusPayload,
};

/// Receives sync deliveries. The application implements this; the sync
/// engine never interprets block bytes beyond height bookkeeping.
pub trait BlockSink: Send + Sync {
    /// Invoked strictly in ascending height order: height `h` is never
    /// called before every height below it that is part of this sync run.
    fn apply_block(&self, height: u64, payload: &[u8]) -> Result<(), SyncError>;

    /// One verified snapshot chunk, in order starting at index 0.
    fn apply_snapshot_chunk(&self, manifest_hash: [u8; 32], chunk_index: u32, data: &[u8]) -> Result<(), SyncError> {
        let _ = (manifest_hash, chunk_index, data);
        Ok(())
    }

    /// All chunks of a snapshot applied; sync resumes `BlockSync` from
    /// `height + 1`.
    fn finalize_snapshot(&self, manifest_hash: [u8; 32], height: u64) -> Result<(), SyncError> {
        let _ = (manifest_hash, height);
        Ok(())
    }
}

impl<F> BlockSink for F
where
    F: Fn(u64, &[u8]) -> Result<(), SyncError> + Send + Sync,
{
    fn apply_block(&self, height: u64, payload: &[u8]) -> Result<(), SyncError> {
        self(height, payload)
    }
}

fn now_from_system_clock() -> Timestamp {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Timestamp::new(secs)
}

/// Majority agreement among a set of snapshot-manifest responses: the
/// plurality value must be held by at least `threshold` of respondents,
/// and at least `min_nodes` responses must have been collected at all.
fn check_consensus<T: Clone + PartialEq>(responses: &[T], min_nodes: usize, threshold: f64) -> Option<T> {
    if responses.len() < min_nodes || responses.is_empty() {
        return None;
    }
    let mut counts: Vec<(T, usize)> = Vec::new();
    for r in responses {
        match counts.iter_mut().find(|(v, _)| v == r) {
            Some((_, c)) => *c += 1,
            None => counts.push((r.clone(), 1)),
        }
    }
    let (best, count) = counts.into_iter().max_by_key(|(_, c)| *c)?;
    let required = (responses.len() as f64 * threshold).ceil() as usize;
    if count >= required {
        Some(best)
    } else {
        None
    }
}

/// In-progress manifest agreement vote for a snapshot sync attempt. Cleared
/// once a snapshot completes or is abandoned.
struct SnapshotNegotiation {
    /// `(manifest_hash, total_chunks)` reported by each peer's first chunk.
    first_chunks: Vec<([u8; 32], u32)>,
    agreed: Option<([u8; 32], u32)>,
}

pub struct SyncEngine<S: BlockSink + 'static> {
    config: SyncConfig,
    protocol: Arc<ProtocolEngine>,
    reputation: Arc<ReputationManager>,
    sink: Arc<S>,
    reliability: ReliabilityTracker,
    state: Mutex<SyncState>,
    snapshot: Mutex<Option<SnapshotNegotiation>>,
    health_tx: mpsc::Sender<HealthEvent>,
    next_request_id: AtomicU64,
}

impl<S: BlockSink + 'static> SyncEngine<S> {
    pub fn new(
        config: SyncConfig,
        protocol: Arc<ProtocolEngine>,
        reputation: Arc<ReputationManager>,
        sink: Arc<S>,
        local_height: u64,
        health_tx: mpsc::Sender<HealthEvent>,
    ) -> Arc<Self> {
        protocol.set_local_height(local_height as i64);
        Arc::new(Self {
            config,
            protocol,
            reputation,
            sink,
            reliability: ReliabilityTracker::new(),
            state: Mutex::new(SyncState::new(local_height)),
            snapshot: Mutex::new(None),
            health_tx,
            next_request_id: AtomicU64::new(1),
        })
    }

    pub fn status(&self) -> (SyncMode, u64, u64) {
        let state = self.state.lock();
        (state.mode, state.local_height, state.target_height)
    }

    pub fn is_caught_up(&self) -> bool {
        matches!(self.state.lock().mode, SyncMode::Caught)
    }

    /// Records a peer-advertised height, registered as the `Status`
    /// handler. Wakes sync out of `Idle`/`Caught` if the target advances.
    fn handle_status(&self, _peer: PeerId, payload: &[u8]) {
        let Ok(status) = StatusPayload::decode(payload) else {
            return;
        };
        let mut state = self.state.lock();
        if status.best_height > state.target_height {
            state.target_height = status.best_height;
            if matches!(state.mode, SyncMode::Idle | SyncMode::Caught) && state.is_behind() {
                state.mode = SyncMode::BlockSync;
                state.caught_since = None;
            }
        }
    }

    fn handle_block_response(&self, peer: PeerId, payload: &[u8]) {
        let now = now_from_system_clock();
        let Ok(response) = BlockResponsePayload::decode(payload) else {
            self.reputation.record_event(peer, now, PeerEventKind::Malformed);
            return;
        };

        let mut state = self.state.lock();
        let request = state
            .in_flight
            .iter()
            .find(|(_, r)| r.peer == peer)
            .map(|(id, r)| (*id, r.clone()));
        let Some((request_id, request)) = request else {
            // Late or duplicate response to a request we already reassigned.
            return;
        };

        let heights: Vec<u64> = response.blocks.iter().map(|b| b.height).collect();
        let in_range = heights.iter().all(|h| *h >= request.start_height && *h <= request.end_height);
        let ascending = heights.windows(2).all(|w| w[0] < w[1]);
        if !in_range || !ascending || heights.is_empty() {
            drop(state);
            self.reputation.record_event(peer, now, PeerEventKind::InvalidBlock);
            self.reliability.record_failure(peer);
            self.reassign(request_id, request);
            return;
        }

        state.in_flight.remove(&request_id);
        drop(state);

        for block in response.blocks {
            if let Err(e) = self.deliver(block.height, block.payload) {
                tracing::warn!(error = %e, peer = %peer, height = block.height, "sink rejected block, re-planning");
                self.reputation.record_event(peer, now, PeerEventKind::InvalidBlock);
                self.reliability.record_failure(peer);
                self.state.lock().reorder_buffer.clear();
                return;
            }
        }
        self.reliability.record_success(peer, Duration::from_secs(0), self.config.request_deadline);
        self.reputation.record_event(peer, now, PeerEventKind::ValidMessage);
    }

    /// Inserts a block at its height, applying it and every now-contiguous
    /// buffered block in ascending order.
    fn deliver(&self, height: u64, payload: Vec<u8>) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if height < state.next_delivery_height {
            return Ok(()); // duplicate of an already-applied height
        }
        state.reorder_buffer.insert(height, (now_from_system_clock(), payload));

        loop {
            let height_to_apply = state.next_delivery_height;
            let Some((_, next_payload)) = state.reorder_buffer.remove(&height_to_apply) else {
                break;
            };
            drop(state);
            self.sink.apply_block(height_to_apply, &next_payload)?;
            state = self.state.lock();
            state.local_height = height_to_apply;
            state.next_delivery_height = height_to_apply + 1;
        }
        Ok(())
    }

    fn reassign(&self, request_id: u64, mut request: InFlightRequest) {
        let mut state = self.state.lock();
        request.retries += 1;
        if request.retries > self.config.retry_attempts {
            tracing::warn!(
                start = request.start_height,
                end = request.end_height,
                "abandoning batch after exhausting retries, re-planning from next known-good height"
            );
            state.in_flight.remove(&request_id);
            return;
        }
        state.in_flight.remove(&request_id);
        drop(state);
        self.dispatch_request(request.start_height, request.end_height, Some(request.retries));
    }

    fn candidate_peer(&self, exclude: &[PeerId]) -> Option<PeerId> {
        self.protocol
            .peers()
            .into_iter()
            .filter(|p| !exclude.contains(&p.id))
            .filter(|p| self.reliability.score_of(&p.id) >= self.config.reliability_floor)
            .max_by(|a, b| self.reliability.score_of(&a.id).total_cmp(&self.reliability.score_of(&b.id)))
            .map(|p| p.id)
    }

    fn dispatch_request(&self, start: u64, end: u64, retries: Option<u32>) {
        let already_assigned: Vec<PeerId> = self.state.lock().in_flight.values().map(|r| r.peer).collect();
        let Some(peer) = self.candidate_peer(&already_assigned) else {
            return;
        };
        let payload = BlockRequestPayload { start_height: start, end_height: end }.encode();
        if self.protocol.send_to(peer, MessageType::BlockRequest, payload).is_err() {
            self.reliability.record_failure(peer);
            return;
        }
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        state.in_flight.insert(
            request_id,
            InFlightRequest {
                peer,
                start_height: start,
                end_height: end,
                deadline: now_from_system_clock().add_secs(self.config.request_deadline.as_secs()),
                retries: retries.unwrap_or(0),
            },
        );
    }

    fn batch_size(&self, state: &SyncState) -> u64 {
        // Shrinks toward the minimum as the remaining gap closes, so the
        // last request of a sync run doesn't over-fetch past the target.
        let remaining = state.target_height.saturating_sub(state.next_unclaimed_height()) + 1;
        remaining.clamp(self.config.batch_size_min, self.config.batch_size_max)
    }

    fn reap_timed_out_requests(&self) {
        let now = now_from_system_clock();
        let timed_out: Vec<(u64, InFlightRequest)> = {
            let state = self.state.lock();
            state
                .in_flight
                .iter()
                .filter(|(_, r)| now.as_secs() >= r.deadline.as_secs())
                .map(|(id, r)| (*id, r.clone()))
                .collect()
        };
        for (id, req) in timed_out {
            tracing::debug!(peer = %req.peer, start = req.start_height, end = req.end_height, "request timed out, reassigning");
            self.reliability.record_failure(req.peer);
            self.reassign(id, req);
        }
    }

    fn reap_stale_reorder_buffer(&self) {
        let now = now_from_system_clock();
        let mut state = self.state.lock();
        let window = self.config.reorder_window.as_secs();
        let stale_at = state.next_delivery_height;
        let has_stale = state
            .reorder_buffer
            .values()
            .next()
            .map(|(ts, _)| now.as_secs().saturating_sub(ts.as_secs()) > window)
            .unwrap_or(false);
        if has_stale {
            tracing::warn!(at = stale_at, "reorder buffer window expired, gap unclosable, re-planning");
            state.reorder_buffer.clear();
            let _ = self.health_tx.try_send(HealthEvent::issue(
                "sync",
                SyncError::GapUnclosable { at: stale_at }.to_string(),
            ));
        }
    }

    fn schedule_more(&self) {
        loop {
            let (should_request, start, end) = {
                let state = self.state.lock();
                if state.in_flight.len() >= self.config.max_concurrent_requests {
                    break;
                }
                if !state.is_behind() {
                    break;
                }
                let start = state.next_unclaimed_height();
                if start > state.target_height {
                    break;
                }
                let batch = self.batch_size(&state);
                let end = (start + batch - 1).min(state.target_height);
                (true, start, end)
            };
            if !should_request {
                break;
            }
            let already_assigned: Vec<PeerId> = self.state.lock().in_flight.values().map(|r| r.peer).collect();
            if self.candidate_peer(&already_assigned).is_none() {
                let _ = self.health_tx.try_send(HealthEvent::issue("sync", SyncError::NoReliablePeers.to_string()));
                break;
            }
            self.dispatch_request(start, end, None);
        }
    }

    fn update_mode(&self) {
        let now = now_from_system_clock();
        let mut state = self.state.lock();
        if state.is_behind() {
            state.caught_since = None;
            if matches!(state.mode, SyncMode::Idle | SyncMode::Caught) {
                state.mode = SyncMode::BlockSync;
            }
        } else {
            match state.caught_since {
                None => state.caught_since = Some(now),
                Some(since) if now.as_secs() - since.as_secs() >= self.config.caught_confirm_interval.as_secs() => {
                    state.mode = SyncMode::Caught;
                }
                Some(_) => {}
            }
        }
    }

    fn publish_metrics(&self) {
        let state = self.state.lock();
        p2p_telemetry::SYNC_LOCAL_HEIGHT.set(state.local_height as f64);
        p2p_telemetry::SYNC_TARGET_HEIGHT.set(state.target_height as f64);
        p2p_telemetry::SYNC_INFLIGHT_REQUESTS.set(state.in_flight.len() as f64);
    }

    /// Queries `snapshot_consensus_peers` reliable peers for a snapshot
    /// manifest near `near_height`; if enough of them agree on the same
    /// manifest hash and chunk count, applies a scaffolded sequential
    /// chunk transfer from one of the agreeing peers. On success, sync
    /// resumes `BlockSync` from `manifest height + 1`.
    pub async fn begin_snapshot_sync(self: &Arc<Self>, near_height: u64) -> Result<(), SyncError> {
        let candidates: Vec<PeerId> = {
            let mut peers = self.protocol.peers();
            peers.sort_by(|a, b| self.reliability.score_of(&b.id).total_cmp(&self.reliability.score_of(&a.id)));
            peers.into_iter().map(|p| p.id).take(self.config.snapshot_consensus_peers.max(3)).collect()
        };
        if candidates.len() < self.config.snapshot_consensus_peers {
            return Err(SyncError::NoReliablePeers);
        }

        self.state.lock().mode = SyncMode::SnapshotSync;
        *self.snapshot.lock() = Some(SnapshotNegotiation { first_chunks: Vec::new(), agreed: None });

        for peer in &candidates {
            let payload = SnapshotRequestPayload { near_height }.encode();
            let _ = self.protocol.send_to(*peer, MessageType::SnapshotRequest, payload);
        }
        // Responses arrive asynchronously through `handle_snapshot_chunk`,
        // which runs the manifest-agreement check once enough first chunks
        // have been collected. This call only seeds the request fan-out.
        Ok(())
    }

    /// Gates chunk application behind cross-peer agreement on the manifest:
    /// the first chunk from each peer casts a `(manifest_hash, total_chunks)`
    /// vote, and only once `check_consensus` finds a majority is any chunk
    /// actually applied. Chunks that disagree with an already-agreed
    /// manifest are ignored as minority/stale responses.
    fn handle_snapshot_chunk(&self, peer: PeerId, payload: &[u8]) {
        let now = now_from_system_clock();
        let Ok(chunk) = SnapshotChunkPayload::decode(payload) else {
            self.reputation.record_event(peer, now, PeerEventKind::Malformed);
            return;
        };
        if chunk.computed_chunk_hash() != chunk.chunk_hash {
            self.reputation.record_event(peer, now, PeerEventKind::InvalidBlock);
            return;
        }

        let agreed = {
            let mut guard = self.snapshot.lock();
            let Some(negotiation) = guard.as_mut() else {
                return;
            };
            match negotiation.agreed {
                Some(agreed) => {
                    if (chunk.manifest_hash, chunk.total_chunks) != agreed {
                        tracing::debug!(peer = %peer, "snapshot chunk from manifest-disagreeing peer ignored");
                        return;
                    }
                    agreed
                }
                None => {
                    if chunk.chunk_index != 0 {
                        // A later chunk arrived before consensus on the
                        // manifest itself; too early to act on.
                        return;
                    }
                    negotiation.first_chunks.push((chunk.manifest_hash, chunk.total_chunks));
                    match check_consensus(
                        &negotiation.first_chunks,
                        self.config.snapshot_consensus_peers,
                        self.config.snapshot_consensus_threshold,
                    ) {
                        Some(winner) => {
                            negotiation.agreed = Some(winner);
                            winner
                        }
                        None => return,
                    }
                }
            }
        };
        if agreed != (chunk.manifest_hash, chunk.total_chunks) {
            return;
        }

        if let Err(e) = self.sink.apply_snapshot_chunk(chunk.manifest_hash, chunk.chunk_index, &chunk.data) {
            tracing::warn!(error = %e, peer = %peer, "snapshot chunk rejected by sink");
            return;
        }
        if chunk.chunk_index + 1 == chunk.total_chunks {
            if self.sink.finalize_snapshot(chunk.manifest_hash, chunk.height).is_ok() {
                *self.snapshot.lock() = None;
                let mut state = self.state.lock();
                state.local_height = chunk.height;
                state.next_delivery_height = chunk.height + 1;
                state.mode = SyncMode::BlockSync;
                state.reorder_buffer.clear();
            }
        }
    }

    fn tick(&self) {
        self.reap_timed_out_requests();
        self.reap_stale_reorder_buffer();
        self.update_mode();
        if matches!(self.state.lock().mode, SyncMode::BlockSync) {
            self.schedule_more();
        }
        self.publish_metrics();
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let status_handler = self.clone();
        self.protocol.register_handler(
            MessageType::Status,
            Arc::new(move |peer: PeerId, payload: &[u8]| {
                status_handler.handle_status(peer, payload);
                Ok(())
            }),
        );
        let response_handler = self.clone();
        self.protocol.register_handler(
            MessageType::BlockResponse,
            Arc::new(move |peer: PeerId, payload: &[u8]| {
                response_handler.handle_block_response(peer, payload);
                Ok(())
            }),
        );
        let chunk_handler = self.clone();
        self.protocol.register_handler(
            MessageType::SnapshotChunk,
            Arc::new(move |peer: PeerId, payload: &[u8]| {
                chunk_handler.handle_snapshot_chunk(peer, payload);
                Ok(())
            }),
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.tick(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_addrbook::AddressBookManager;
    use p2p_protocol::{NodeIdentity, ProtocolConfig};
    use p2p_reputation::ReputationConfig;
    use p2p_addrbook::AddressBookConfig;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    fn build_protocol_engine() -> Arc<ProtocolEngine> {
        use ed25519_dalek::SigningKey;
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let identity = NodeIdentity::new(key, "cosmos-core-1".to_string(), [1; 32], 1 << 16);
        let (health_tx, _rx) = mpsc::channel(8);
        let reputation = ReputationManager::new(ReputationConfig::for_testing(), PathBuf::from("/tmp"), health_tx.clone());
        let addrbook =
            AddressBookManager::new(AddressBookConfig::for_testing(), identity.peer_id, PathBuf::from("/tmp"), health_tx.clone());
        ProtocolEngine::new(identity, ProtocolConfig::for_testing(), reputation, addrbook, health_tx)
    }

    struct RecordingSink {
        applied: StdMutex<Vec<u64>>,
        snapshot_chunks: StdMutex<Vec<u32>>,
        finalized: StdMutex<Option<[u8; 32]>>,
    }

    impl BlockSink for RecordingSink {
        fn apply_block(&self, height: u64, _payload: &[u8]) -> Result<(), SyncError> {
            self.applied.lock().unwrap().push(height);
            Ok(())
        }

        fn apply_snapshot_chunk(&self, _manifest_hash: [u8; 32], chunk_index: u32, _data: &[u8]) -> Result<(), SyncError> {
            self.snapshot_chunks.lock().unwrap().push(chunk_index);
            Ok(())
        }

        fn finalize_snapshot(&self, manifest_hash: [u8; 32], _height: u64) -> Result<(), SyncError> {
            *self.finalized.lock().unwrap() = Some(manifest_hash);
            Ok(())
        }
    }

    fn build_engine(local_height: u64) -> (Arc<SyncEngine<RecordingSink>>, Arc<RecordingSink>) {
        let protocol = build_protocol_engine();
        let (health_tx, _rx) = mpsc::channel(8);
        let reputation = ReputationManager::new(ReputationConfig::for_testing(), PathBuf::from("/tmp"), health_tx.clone());
        let sink = Arc::new(RecordingSink {
            applied: StdMutex::new(Vec::new()),
            snapshot_chunks: StdMutex::new(Vec::new()),
            finalized: StdMutex::new(None),
        });
        let engine = SyncEngine::new(SyncConfig::for_testing(), protocol, reputation, sink.clone(), local_height, health_tx);
        (engine, sink)
    }

    #[test]
    fn status_update_advances_target_and_mode() {
        let (engine, _sink) = build_engine(10);
        engine.handle_status(PeerId::new([1; 32]), &StatusPayload { best_height: 50 }.encode());
        let (mode, local, target) = engine.status();
        assert_eq!(target, 50);
        assert_eq!(local, 10);
        assert!(matches!(mode, SyncMode::BlockSync));
    }

    #[test]
    fn stale_status_does_not_move_target_backwards() {
        let (engine, _sink) = build_engine(10);
        engine.handle_status(PeerId::new([1; 32]), &StatusPayload { best_height: 50 }.encode());
        engine.handle_status(PeerId::new([1; 32]), &StatusPayload { best_height: 20 }.encode());
        assert_eq!(engine.status().2, 50);
    }

    #[test]
    fn in_order_delivery_applies_immediately() {
        let (engine, sink) = build_engine(0);
        engine.deliver(1, vec![1]).unwrap();
        engine.deliver(2, vec![2]).unwrap();
        assert_eq!(*sink.applied.lock().unwrap(), vec![1, 2]);
        assert_eq!(engine.status().1, 2);
    }

    #[test]
    fn out_of_order_delivery_buffers_until_gap_closes() {
        let (engine, sink) = build_engine(0);
        engine.deliver(3, vec![3]).unwrap();
        assert!(sink.applied.lock().unwrap().is_empty());
        engine.deliver(2, vec![2]).unwrap();
        assert!(sink.applied.lock().unwrap().is_empty());
        engine.deliver(1, vec![1]).unwrap();
        assert_eq!(*sink.applied.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_delivery_below_next_height_is_a_no_op() {
        let (engine, sink) = build_engine(0);
        engine.deliver(1, vec![1]).unwrap();
        engine.deliver(1, vec![1]).unwrap();
        assert_eq!(*sink.applied.lock().unwrap(), vec![1]);
    }

    #[test]
    fn check_consensus_requires_supermajority_agreement() {
        let responses = vec![1, 1, 1, 2];
        assert_eq!(check_consensus(&responses, 3, 2.0 / 3.0), Some(1));
        let split = vec![1, 2, 3];
        assert_eq!(check_consensus(&split, 3, 2.0 / 3.0), None);
    }

    #[test]
    fn check_consensus_requires_minimum_node_count() {
        let responses = vec![1, 1];
        assert_eq!(check_consensus(&responses, 3, 2.0 / 3.0), None);
    }

    fn signed_chunk(manifest_hash: [u8; 32], total_chunks: u32, chunk_index: u32, data: &[u8]) -> SnapshotChunkPayload {
        let mut chunk = SnapshotChunkPayload {
            manifest_hash,
            total_chunks,
            chunk_index,
            chunk_hash: [0; 32],
            height: 1_000,
            data: data.to_vec(),
        };
        chunk.chunk_hash = chunk.computed_chunk_hash();
        chunk
    }

    #[test]
    fn agreeing_peers_reach_consensus_and_chunk_is_applied() {
        let (engine, sink) = build_engine(0);
        engine.state.lock().mode = SyncMode::SnapshotSync;
        *engine.snapshot.lock() = Some(SnapshotNegotiation { first_chunks: Vec::new(), agreed: None });

        let manifest = [7; 32];
        let a = signed_chunk(manifest, 2, 0, b"chunk-a");
        let b = signed_chunk(manifest, 2, 0, b"chunk-a");
        engine.handle_snapshot_chunk(PeerId::new([1; 32]), &a.encode());
        assert!(sink.snapshot_chunks.lock().unwrap().is_empty(), "single vote must not apply the chunk");
        engine.handle_snapshot_chunk(PeerId::new([2; 32]), &b.encode());
        assert_eq!(*sink.snapshot_chunks.lock().unwrap(), vec![0]);
    }

    #[test]
    fn dissenting_peer_is_ignored_once_consensus_is_reached() {
        let (engine, sink) = build_engine(0);
        engine.state.lock().mode = SyncMode::SnapshotSync;
        *engine.snapshot.lock() = Some(SnapshotNegotiation { first_chunks: Vec::new(), agreed: None });

        let manifest = [7; 32];
        let agreed_a = signed_chunk(manifest, 2, 0, b"chunk-a");
        let agreed_b = signed_chunk(manifest, 2, 0, b"chunk-a");
        engine.handle_snapshot_chunk(PeerId::new([1; 32]), &agreed_a.encode());
        engine.handle_snapshot_chunk(PeerId::new([2; 32]), &agreed_b.encode());
        assert_eq!(*sink.snapshot_chunks.lock().unwrap(), vec![0]);

        let dissenting = signed_chunk([9; 32], 2, 1, b"minority-chunk");
        engine.handle_snapshot_chunk(PeerId::new([3; 32]), &dissenting.encode());
        assert_eq!(*sink.snapshot_chunks.lock().unwrap(), vec![0], "dissenting manifest must be ignored");

        let final_chunk = signed_chunk(manifest, 2, 1, b"chunk-b");
        engine.handle_snapshot_chunk(PeerId::new([1; 32]), &final_chunk.encode());
        assert_eq!(*sink.snapshot_chunks.lock().unwrap(), vec![0, 1]);
        assert_eq!(*sink.finalized.lock().unwrap(), Some(manifest));
        assert!(engine.snapshot.lock().is_none());
        assert!(matches!(engine.status().0, SyncMode::BlockSync));
    }
}
