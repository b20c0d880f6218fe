//! # P2P Node
//!
//! Composition root for the networking core: wires reputation, address
//! book, protocol engine, peer manager and sync into a single [`Node`]
//! facade a hosting application can start, stop, and poll for health
//! without touching any component directly.

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod health;
pub mod node;

pub use bootstrap::Bootstrapper;
pub use config::{ConfigError, DiscoverySection, GossipSection, NetworkSection, NodeConfig, ReputationSection, SyncSection};
pub use errors::NodeError;
pub use health::{HealthAggregator, NodeHealth};
pub use node::Node;
