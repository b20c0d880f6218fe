use std::path::{Path, PathBuf};

use p2p_types::PeerAddress;
use serde::{Deserialize, Serialize};

use crate::errors::AddressBookError;

#[derive(Debug, Serialize, Deserialize)]
struct AddressBookSnapshot {
    entries: Vec<PeerAddress>,
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), AddressBookError> {
    let tmp_path = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AddressBookError::Io(e.to_string()))?;
    }
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| AddressBookError::Io(e.to_string()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| AddressBookError::Io(e.to_string()))
}

/// Writes every known address as JSON via write-tmp-then-rename so a crash
/// mid-write never corrupts the on-disk book.
pub async fn save(path: &Path, entries: Vec<PeerAddress>) -> Result<(), AddressBookError> {
    let snapshot = AddressBookSnapshot { entries };
    let json = serde_json::to_vec_pretty(&snapshot).map_err(|e| AddressBookError::Io(e.to_string()))?;
    write_atomic(path, &json).await
}

/// Loads the address book. A missing file starts empty rather than erroring
/// — the book rebuilds itself from seeds and gossip over time.
pub async fn load(path: &Path) -> Result<Vec<PeerAddress>, AddressBookError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AddressBookError::Io(e.to_string()))?;
    let snapshot: AddressBookSnapshot =
        serde_json::from_slice(&bytes).map_err(|e| AddressBookError::Io(e.to_string()))?;
    Ok(snapshot.entries)
}

pub fn book_path(data_dir: &Path) -> PathBuf {
    data_dir.join("addrbook.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2p_types::{IpAddr, NetAddr, PeerId, PeerSource, Timestamp};

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = book_path(dir.path());
        let entry = PeerAddress::new(
            PeerId::new([1; 32]),
            NetAddr::new(IpAddr::v4(1, 2, 3, 4), 9000),
            PeerSource::Seed,
            Timestamp::new(0),
        );
        save(&path, vec![entry]).await.unwrap();
        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = book_path(dir.path());
        assert!(load(&path).await.unwrap().is_empty());
    }
}
