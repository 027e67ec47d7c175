//! Core ledger functionality
//!
//! This module contains the block data model, the proof-of-work rule and the
//! chain with its validation and replacement policy.

pub mod block;
pub mod chain;
pub mod proof_of_work;

pub use block::{Block, MediaInfo, GENESIS_PREVIOUS_HASH};
pub use chain::Chain;
pub use proof_of_work::{CancelFlag, ProofOfWork, MAX_DIFFICULTY};
