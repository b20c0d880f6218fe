use std::collections::HashMap;
use std::path::{Path, PathBuf};

use p2p_types::{PeerId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::errors::ReputationError;
use crate::record::PeerRecord;

#[derive(Debug, Serialize, Deserialize)]
struct PeerRecordMapEntry {
    id: String,
    record: PeerRecord,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BanEntry {
    pub id: String,
    pub reason: String,
    pub until: Option<Timestamp>,
    pub count: u32,
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ReputationError> {
    let tmp_path = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ReputationError::StorageIo(e.to_string()))?;
    }
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| ReputationError::StorageIo(e.to_string()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ReputationError::StorageIo(e.to_string()))
}

/// Writes the full peer-record table as JSON via write-tmp-then-rename.
pub async fn save_peers(
    path: &Path,
    records: &HashMap<PeerId, PeerRecord>,
) -> Result<(), ReputationError> {
    let entries: Vec<PeerRecordMapEntry> = records
        .iter()
        .map(|(id, record)| PeerRecordMapEntry {
            id: id.to_hex(),
            record: record.clone(),
        })
        .collect();
    let json = serde_json::to_vec_pretty(&entries)
        .map_err(|e| ReputationError::StorageIo(e.to_string()))?;
    write_atomic(path, &json).await
}

/// Loads the peer-record table. A missing file is not an error at the
/// persistence layer — callers treat it as "start empty" per the
/// component's startup contract.
pub async fn load_peers(path: &Path) -> Result<HashMap<PeerId, PeerRecord>, ReputationError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ReputationError::StorageIo(e.to_string()))?;
    let entries: Vec<PeerRecordMapEntry> =
        serde_json::from_slice(&bytes).map_err(|e| ReputationError::StorageIo(e.to_string()))?;
    let mut out = HashMap::with_capacity(entries.len());
    for entry in entries {
        let id = parse_hex_id(&entry.id)?;
        out.insert(id, entry.record);
    }
    Ok(out)
}

pub async fn save_bans(
    path: &Path,
    records: &HashMap<PeerId, PeerRecord>,
) -> Result<(), ReputationError> {
    let entries: Vec<BanEntry> = records
        .iter()
        .filter(|(_, r)| r.ban.permanently_banned || r.ban.banned_until.is_some())
        .map(|(id, r)| BanEntry {
            id: id.to_hex(),
            reason: r.ban.reason.clone().unwrap_or_default(),
            until: r.ban.banned_until,
            count: r.ban.temp_count,
        })
        .collect();
    let json =
        serde_json::to_vec_pretty(&entries).map_err(|e| ReputationError::StorageIo(e.to_string()))?;
    write_atomic(path, &json).await
}

fn parse_hex_id(hex: &str) -> Result<PeerId, ReputationError> {
    if hex.len() != 64 {
        return Err(ReputationError::StorageIo(format!(
            "malformed peer id '{hex}'"
        )));
    }
    let mut bytes = [0u8; 32];
    for i in 0..32 {
        bytes[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| ReputationError::StorageIo(e.to_string()))?;
    }
    Ok(PeerId::new(bytes))
}

pub fn peers_path(data_dir: &Path) -> PathBuf {
    data_dir.join("reputation").join("peers.json")
}

pub fn bans_path(data_dir: &Path) -> PathBuf {
    data_dir.join("reputation").join("bans.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = peers_path(dir.path());

        let mut records = HashMap::new();
        let id = PeerId::new([7u8; 32]);
        records.insert(id, PeerRecord::new(id, None, Timestamp::new(100)));

        save_peers(&path, &records).await.unwrap();
        let loaded = load_peers(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key(&id));
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = peers_path(dir.path());
        let loaded = load_peers(&path).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn bans_file_only_contains_banned_peers() {
        let dir = tempfile::tempdir().unwrap();
        let path = bans_path(dir.path());

        let mut records = HashMap::new();
        let clean_id = PeerId::new([1u8; 32]);
        let banned_id = PeerId::new([2u8; 32]);
        records.insert(clean_id, PeerRecord::new(clean_id, None, Timestamp::new(0)));
        let mut banned = PeerRecord::new(banned_id, None, Timestamp::new(0));
        banned.ban.permanently_banned = true;
        banned.ban.reason = Some("double sign".to_string());
        records.insert(banned_id, banned);

        save_bans(&path, &records).await.unwrap();
        let bytes = tokio::fs::read(&path).await.unwrap();
        let entries: Vec<BanEntry> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, banned_id.to_hex());
    }
}
