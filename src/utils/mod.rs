//! Utility functions and helpers
//!
//! Hashing, timestamps and small socket helpers used throughout the ledger.

pub mod crypto;
pub mod net;

pub use crypto::{current_timestamp, sha256_digest, sha256_hex};
pub use net::{find_free_port, local_ipv4};
