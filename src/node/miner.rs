use crate::core::{Block, CancelFlag, MediaInfo};
use crate::error::{BlockchainError, Result};
use crate::node::Node;
use log::{error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A proof-of-work search running on its own thread
pub struct MiningJob {
    cancel: CancelFlag,
    handle: JoinHandle<Result<Block>>,
}

impl MiningJob {
    pub fn spawn(node: Arc<Node>, data: String, media: Option<MediaInfo>) -> MiningJob {
        let cancel = CancelFlag::new();
        let job_cancel = cancel.clone();
        let handle = thread::spawn(move || {
            let result = node.mine(&data, media.as_ref(), Some(&job_cancel));
            match &result {
                Ok(block) => info!("Mined new block: {}", block.get_hash()),
                Err(e) => error!("Mining job ended without a block: {e}"),
            }
            result
        });
        MiningJob { cancel, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job and return the block it appended
    pub fn join(self) -> Result<Block> {
        self.handle
            .join()
            .map_err(|_| BlockchainError::Mining("Mining thread panicked".to_string()))?
    }
}
