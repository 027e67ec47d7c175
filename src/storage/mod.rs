//! Durable storage
//!
//! The chain is persisted as a line-oriented log next to the node.

pub mod chain_store;

pub use chain_store::ChainStore;
