//! Peer-to-peer networking
//!
//! This module handles multicast discovery of other nodes, the registry of
//! known peers and the TCP server that answers `GET /status` and `GET /chain`.

pub mod discovery;
pub mod peer_registry;
pub mod server;

pub use discovery::{
    parse_announcement, Announcement, DiscoveryService, DISCOVERY_REQUEST_TAG,
    DISCOVERY_RESPONSE_TAG,
};
pub use peer_registry::{Peer, PeerRegistry};
pub use server::{fetch_chain, query_status, PeerSession, Request, Server, ServerHandle};
