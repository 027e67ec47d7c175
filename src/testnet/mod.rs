//! Test helpers for running nodes on loopback
//!
//! Nodes get a temporary chain file, a low difficulty and a short discovery
//! window so tests stay fast.

pub mod test_utils;

pub use test_utils::*;
