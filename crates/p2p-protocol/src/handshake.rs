//! Handshake identity proof and the accept/reject gate.
//!
//! The wire payload itself (`HandshakePayload`/`HandshakeAckPayload`) is
//! fixed by the external wire protocol and lives in `p2p_types`. This
//! module adds a detached Ed25519 signature over a per-connection nonce so
//! that claiming a `NodeID` also proves possession of the private key
//! behind it, and runs the four-filter accept/reject gate over the
//! unsigned fields.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use p2p_types::{HandshakePayload, PeerId, WireError};

const NONCE_LEN: usize = 8;
const SIGNATURE_LEN: usize = 64;
const PUBKEY_LEN: usize = 32;

/// Long-lived identity of the local node: the signing key whose public half
/// hashes to our [`PeerId`], plus the chain binding we present in every
/// handshake.
pub struct NodeIdentity {
    pub peer_id: PeerId,
    pub signing_key: SigningKey,
    pub chain_id: String,
    pub genesis_hash: [u8; 32],
    pub protocol_version: u32,
}

impl NodeIdentity {
    pub fn new(signing_key: SigningKey, chain_id: String, genesis_hash: [u8; 32], protocol_version: u32) -> Self {
        let peer_id = PeerId::new(*peer_id_from_pubkey(&signing_key.verifying_key()));
        Self {
            peer_id,
            signing_key,
            chain_id,
            genesis_hash,
            protocol_version,
        }
    }
}

/// Derives a `PeerId` from a public key. Uses SHA-512 (the hash already
/// pulled in transitively by `ed25519-dalek`) truncated to 32 bytes rather
/// than introducing a second digest algorithm for one-time key hashing.
fn peer_id_from_pubkey(vk: &VerifyingKey) -> Box<[u8; 32]> {
    use sha2::{Digest, Sha512};
    let digest = Sha512::digest(vk.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    Box::new(out)
}

/// Handshake payload plus the raw public key behind `payload.node_id` and a
/// signature over `payload_bytes || nonce`, proving possession of the
/// private key rather than just asserting the hash.
#[derive(Debug, Clone)]
pub struct SignedHandshake {
    pub payload: HandshakePayload,
    pub pubkey: [u8; PUBKEY_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub signature: [u8; SIGNATURE_LEN],
}

impl SignedHandshake {
    pub fn sign(identity: &NodeIdentity, payload: HandshakePayload, nonce: [u8; NONCE_LEN]) -> Result<Self, WireError> {
        let mut signed_bytes = payload.encode()?;
        signed_bytes.extend_from_slice(&nonce);
        let signature = identity.signing_key.sign(&signed_bytes).to_bytes();
        let pubkey = identity.signing_key.verifying_key().to_bytes();
        Ok(Self { payload, pubkey, nonce, signature })
    }

    /// Checks that `pubkey` hashes to `payload.node_id` and that the
    /// signature was produced by the private key behind it. Both must hold
    /// for the claimed identity to be accepted.
    pub fn verify(&self) -> bool {
        let Ok(vk) = VerifyingKey::from_bytes(&self.pubkey) else {
            return false;
        };
        if *peer_id_from_pubkey(&vk) != *self.payload.node_id.as_bytes() {
            return false;
        }
        let Ok(mut signed_bytes) = self.payload.encode() else {
            return false;
        };
        signed_bytes.extend_from_slice(&self.nonce);
        let sig = Signature::from_bytes(&self.signature);
        vk.verify(&signed_bytes, &sig).is_ok()
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = self.payload.encode()?;
        out.extend_from_slice(&self.pubkey);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.signature);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < PUBKEY_LEN + NONCE_LEN + SIGNATURE_LEN {
            return Err(WireError::Truncated);
        }
        let split = buf.len() - PUBKEY_LEN - NONCE_LEN - SIGNATURE_LEN;
        let payload = HandshakePayload::decode(&buf[..split])?;
        let mut pubkey = [0u8; PUBKEY_LEN];
        pubkey.copy_from_slice(&buf[split..split + PUBKEY_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[split + PUBKEY_LEN..split + PUBKEY_LEN + NONCE_LEN]);
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&buf[split + PUBKEY_LEN + NONCE_LEN..]);
        Ok(Self { payload, pubkey, nonce, signature })
    }
}

/// Why a handshake was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    VersionMismatch,
    ChainIdMismatch,
    GenesisMismatch,
    InvalidNodeId,
    SelfConnection,
    BadSignature,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::VersionMismatch => "version mismatch",
            RejectReason::ChainIdMismatch => "chain id mismatch",
            RejectReason::GenesisMismatch => "genesis hash mismatch",
            RejectReason::InvalidNodeId => "node id empty or self",
            RejectReason::SelfConnection => "self connection",
            RejectReason::BadSignature => "signature verification failed",
        }
    }
}

/// The four-filter accept gate: major version equal, ChainID equal,
/// GenesisHash equal, NodeID non-zero and not our own.
pub fn verify_handshake(ours: &NodeIdentity, theirs: &HandshakePayload) -> Result<(), RejectReason> {
    if major_version(theirs.version) != major_version(ours.protocol_version) {
        return Err(RejectReason::VersionMismatch);
    }
    if theirs.chain_id != ours.chain_id {
        return Err(RejectReason::ChainIdMismatch);
    }
    if theirs.genesis_hash != ours.genesis_hash {
        return Err(RejectReason::GenesisMismatch);
    }
    if theirs.node_id.is_zero() {
        return Err(RejectReason::InvalidNodeId);
    }
    if theirs.node_id == ours.peer_id {
        return Err(RejectReason::SelfConnection);
    }
    Ok(())
}

fn major_version(v: u32) -> u32 {
    v >> 16
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn identity(chain_id: &str, genesis: [u8; 32]) -> NodeIdentity {
        let key = SigningKey::generate(&mut OsRng);
        NodeIdentity::new(key, chain_id.to_string(), genesis, 1 << 16)
    }

    fn payload_from(identity: &NodeIdentity) -> HandshakePayload {
        HandshakePayload {
            node_id: identity.peer_id,
            chain_id: identity.chain_id.clone(),
            genesis_hash: identity.genesis_hash,
            version: identity.protocol_version,
            best_height: 100,
        }
    }

    #[test]
    fn matching_chain_and_genesis_is_accepted() {
        let ours = identity("cosmos-core-1", [1; 32]);
        let theirs = identity("cosmos-core-1", [1; 32]);
        assert!(verify_handshake(&ours, &payload_from(&theirs)).is_ok());
    }

    #[test]
    fn chain_id_mismatch_is_rejected() {
        let ours = identity("cosmos-core-1", [1; 32]);
        let theirs = identity("cosmos-core-2", [1; 32]);
        assert_eq!(
            verify_handshake(&ours, &payload_from(&theirs)),
            Err(RejectReason::ChainIdMismatch)
        );
    }

    #[test]
    fn genesis_mismatch_is_rejected() {
        let ours = identity("cosmos-core-1", [1; 32]);
        let theirs = identity("cosmos-core-1", [2; 32]);
        assert_eq!(
            verify_handshake(&ours, &payload_from(&theirs)),
            Err(RejectReason::GenesisMismatch)
        );
    }

    #[test]
    fn self_connection_is_rejected() {
        let ours = identity("cosmos-core-1", [1; 32]);
        let mut self_payload = payload_from(&ours);
        self_payload.node_id = ours.peer_id;
        assert_eq!(
            verify_handshake(&ours, &self_payload),
            Err(RejectReason::SelfConnection)
        );
    }

    #[test]
    fn major_version_mismatch_is_rejected_but_minor_drift_is_ok() {
        let ours = identity("cosmos-core-1", [1; 32]);
        let mut theirs_payload = payload_from(&identity("cosmos-core-1", [1; 32]));
        theirs_payload.version = (2 << 16) | 3;
        assert_eq!(
            verify_handshake(&ours, &theirs_payload),
            Err(RejectReason::VersionMismatch)
        );

        let mut minor_drift = payload_from(&identity("cosmos-core-1", [1; 32]));
        minor_drift.version = (1 << 16) | 99;
        assert!(verify_handshake(&ours, &minor_drift).is_ok());
    }

    #[test]
    fn signed_handshake_round_trips_and_verifies() {
        let identity = identity("cosmos-core-1", [1; 32]);
        let payload = payload_from(&identity);
        let signed = SignedHandshake::sign(&identity, payload, [7; NONCE_LEN]).unwrap();
        let bytes = signed.encode().unwrap();
        let decoded = SignedHandshake::decode(&bytes).unwrap();
        assert!(decoded.verify());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let identity = identity("cosmos-core-1", [1; 32]);
        let payload = payload_from(&identity);
        let mut signed = SignedHandshake::sign(&identity, payload, [7; NONCE_LEN]).unwrap();
        signed.signature[0] ^= 0xFF;
        assert!(!signed.verify());
    }

    #[test]
    fn mismatched_pubkey_fails_identity_check() {
        let node_identity = identity("cosmos-core-1", [1; 32]);
        let other = identity("cosmos-core-1", [1; 32]);
        let payload = payload_from(&node_identity);
        let mut signed = SignedHandshake::sign(&node_identity, payload, [7; NONCE_LEN]).unwrap();
        signed.pubkey = other.signing_key.verifying_key().to_bytes();
        assert!(!signed.verify());
    }
}
