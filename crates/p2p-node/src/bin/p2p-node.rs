//! Standalone entry point wiring a [`Node`] up with an ephemeral identity
//! and a logging-only block sink. A hosting application that owns real
//! block storage links against the `p2p-node` library directly instead of
//! running this binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use ed25519_dalek::SigningKey;
use p2p_node::{Node, NodeConfig};
use p2p_protocol::NodeIdentity;
use p2p_sync::{BlockSink, SyncError};
use p2p_telemetry::TelemetryConfig;
use rand::rngs::OsRng;
use tracing::info;

/// Sink that only logs what it receives. Stands in for the hosting
/// application's real block storage and state machine.
struct LoggingBlockSink;

impl BlockSink for LoggingBlockSink {
    fn apply_block(&self, height: u64, payload: &[u8]) -> Result<(), SyncError> {
        info!(height, bytes = payload.len(), "received block");
        Ok(())
    }
}

/// Loads the node's signing key from `<data_dir>/node_key`, generating and
/// persisting a fresh one on first run. Key rotation and encrypted storage
/// are left to the hosting application.
fn load_or_generate_signing_key(data_dir: &PathBuf) -> anyhow::Result<SigningKey> {
    let key_path = data_dir.join("node_key");
    if let Ok(bytes) = std::fs::read(&key_path) {
        let array: [u8; 32] = bytes.as_slice().try_into().context("node_key file has the wrong length")?;
        return Ok(SigningKey::from_bytes(&array));
    }
    std::fs::create_dir_all(data_dir).context("creating data directory")?;
    let key = SigningKey::generate(&mut OsRng);
    std::fs::write(&key_path, key.to_bytes()).context("persisting generated node key")?;
    info!(path = %key_path.display(), "generated new node identity key");
    Ok(key)
}

fn parse_genesis_hash(hex: &str) -> anyhow::Result<[u8; 32]> {
    let mut out = [0u8; 32];
    let bytes = hex.as_bytes();
    anyhow::ensure!(bytes.len() == 64, "genesis hash must be 64 hex characters");
    for (i, chunk) in bytes.chunks(2).enumerate() {
        let s = std::str::from_utf8(chunk)?;
        out[i] = u8::from_str_radix(s, 16)?;
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _telemetry = p2p_telemetry::init_telemetry(TelemetryConfig::from_env()).context("initializing telemetry")?;

    info!("===========================================");
    info!("  P2P Networking Node");
    info!("===========================================");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = NodeConfig::load(config_path.as_deref()).context("loading node configuration")?;
    info!(%config, "loaded configuration");

    let signing_key = load_or_generate_signing_key(&config.data_dir)?;
    let chain_id = std::env::var("P2P_CHAIN_ID").unwrap_or_else(|_| "p2p-core-local".to_string());
    let genesis_hash = match std::env::var("P2P_GENESIS_HASH") {
        Ok(hex) => parse_genesis_hash(&hex)?,
        Err(_) => [0u8; 32],
    };
    let protocol_version: u32 = std::env::var("P2P_PROTOCOL_VERSION").ok().and_then(|v| v.parse().ok()).unwrap_or(1);
    let identity = NodeIdentity::new(signing_key, chain_id, genesis_hash, protocol_version);
    info!(peer_id = %identity.peer_id, "node identity ready");

    let local_height: u64 = std::env::var("P2P_LOCAL_HEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(0);
    let node = Node::new(config, identity, local_height, Arc::new(LoggingBlockSink)).await.context("building node")?;

    node.start().await.context("starting node")?;
    info!("node is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;

    info!("shutting down gracefully");
    node.stop().await;
    Ok(())
}
