use crate::core::Block;
use crate::error::{BlockchainError, Result};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How many nonces are tried between two looks at the cancellation flag
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// A SHA-256 hex digest has 64 characters, so no prefix can be longer
pub const MAX_DIFFICULTY: usize = 64;

/// Shared flag used to stop an in-flight proof-of-work search
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Leading-zero proof-of-work: a hash is accepted when its first
/// `difficulty` hex characters are all `'0'`.
pub struct ProofOfWork {
    difficulty: usize,
    target_prefix: String,
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> ProofOfWork {
        ProofOfWork {
            difficulty,
            target_prefix: "0".repeat(difficulty),
        }
    }

    pub fn meets_target(&self, hash: &str) -> bool {
        hash.starts_with(self.target_prefix.as_str())
    }

    /// Validate a block: its stored hash must match its fields and satisfy the target
    pub fn validate(block: &Block, difficulty: usize) -> bool {
        let pow = ProofOfWork::new(difficulty);
        block.get_hash() == block.compute_hash() && pow.meets_target(block.get_hash())
    }

    /// Search nonces until the block hash meets the target.
    ///
    /// The search starts from the block's current nonce and hash, so a block
    /// that already satisfies the target is left untouched.
    pub fn run(&self, block: &mut Block, cancel: Option<&CancelFlag>) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Mining(format!(
                "Difficulty {} exceeds the maximum of {MAX_DIFFICULTY}",
                self.difficulty
            )));
        }

        debug!("Mining block with difficulty {}", self.difficulty);
        let mut attempts: u64 = 0;
        while !self.meets_target(block.get_hash()) {
            if attempts % CANCEL_CHECK_INTERVAL == 0 && cancel.is_some_and(CancelFlag::is_cancelled)
            {
                return Err(BlockchainError::Mining(format!(
                    "Mining cancelled after {attempts} attempts"
                )));
            }
            block.next_nonce()?;
            attempts += 1;
        }
        info!("Block mined: {} (nonce {})", block.get_hash(), block.get_nonce());
        Ok(())
    }
}
