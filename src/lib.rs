//! # Mesh Ledger - A Minimal Peer-to-Peer Ledger
//!
//! A small append-only ledger that every node keeps as a plain text file and
//! shares with the nodes it finds on the local network.
//!
//! ## What It Does
//! - **Proof of Work**: SHA-256 over the block fields, N leading hex zeros
//! - **Chain Store**: One escaped `;` record per line, atomic full rewrites
//! - **Longest Chain Wins**: A strictly longer valid chain replaces ours
//! - **Discovery**: UDP multicast announcements on 230.0.0.0:9876
//! - **Status Server**: Plain TCP, `GET /status` and `GET /chain`
//!
//! ## How The Code Is Organized
//! - `core/`: Blocks, proof of work and the chain rules
//! - `storage/`: The file-backed chain store
//! - `network/`: Peer registry, discovery and the TCP server
//! - `node/`: The node that ties everything together, plus background mining
//! - `config/`: Settings from the environment
//! - `utils/`: Hashing, timestamps and local address helpers
//! - `cli/`: Command-line interface
//!
//! ## Where To Start
//! 1. `main.rs` for the CLI commands
//! 2. `node/mod.rs` for how a running node behaves
//! 3. `core/chain.rs` for what may extend or replace the chain
//! 4. `network/server.rs` for the wire protocol

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{Block, CancelFlag, Chain, MediaInfo, ProofOfWork, GENESIS_PREVIOUS_HASH};
pub use error::{BlockchainError, Result};
pub use network::{
    fetch_chain, query_status, DiscoveryService, Peer, PeerRegistry, Server, ServerHandle,
};
pub use node::{MiningJob, Node, NodeHandle};
pub use storage::ChainStore;
pub use utils::{current_timestamp, local_ipv4, sha256_digest, sha256_hex};
