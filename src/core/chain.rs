// The in-memory chain and the rules that decide what may extend or replace it.
// Every accepted mutation is mirrored to the ChainStore before returning.

use crate::core::{Block, CancelFlag, MediaInfo, GENESIS_PREVIOUS_HASH};
use crate::error::{BlockchainError, Result};
use crate::storage::ChainStore;
use log::{info, warn};

pub struct Chain {
    blocks: Vec<Block>,
    store: ChainStore,
    difficulty: usize,
}

impl Chain {
    /// Load the chain from `store`, mining and persisting a genesis block when
    /// the store is empty.
    pub fn bootstrap(store: ChainStore, difficulty: usize) -> Result<Chain> {
        let blocks = store.load()?;
        let mut chain = Chain {
            blocks,
            store,
            difficulty,
        };

        if chain.blocks.is_empty() {
            info!("Empty chain store, mining genesis block (difficulty {difficulty})");
            let mut genesis = Block::genesis()?;
            genesis.mine(difficulty)?;
            chain.store.append(&genesis)?;
            chain.blocks.push(genesis);
        } else if let Some(index) = Self::first_invalid_index(&chain.blocks) {
            warn!(
                "Chain loaded from {} is invalid at block {index}",
                chain.store.get_path().display()
            );
        }

        Ok(chain)
    }

    /// Append `candidate` if it links to the tail and its hash is genuine.
    ///
    /// Rejection is `Ok(false)` with nothing changed. A store failure after
    /// acceptance is returned as an error; the block stays in memory.
    pub fn try_append(&mut self, candidate: Block) -> Result<bool> {
        let links = self
            .last()
            .is_some_and(|tail| tail.get_hash() == candidate.get_previous_hash());
        if !links || !candidate.has_valid_hash() {
            warn!(
                "Rejected block {}: previous hash does not match or hash is incorrect",
                candidate.get_hash()
            );
            return Ok(false);
        }

        self.blocks.push(candidate);
        let appended = &self.blocks[self.blocks.len() - 1];
        self.store.append(appended)?;
        info!(
            "Block added to chain: {} (height {})",
            appended.get_hash(),
            self.blocks.len() - 1
        );
        Ok(true)
    }

    pub fn validate(&self) -> bool {
        Self::validate_blocks(&self.blocks)
    }

    pub fn validate_blocks(blocks: &[Block]) -> bool {
        Self::first_invalid_index(blocks).is_none()
    }

    /// Index of the first block breaking the genesis, hash or linkage rule
    pub fn first_invalid_index(blocks: &[Block]) -> Option<usize> {
        let genesis = blocks.first()?;
        if genesis.get_previous_hash() != GENESIS_PREVIOUS_HASH || !genesis.has_valid_hash() {
            return Some(0);
        }

        blocks
            .windows(2)
            .position(|pair| {
                let (previous, current) = (&pair[0], &pair[1]);
                !current.has_valid_hash() || current.get_previous_hash() != previous.get_hash()
            })
            .map(|i| i + 1)
    }

    /// Longest valid chain wins: replace ours iff `candidate` is strictly
    /// longer and valid on its own.
    pub fn adopt_if_longer(&mut self, candidate: Vec<Block>) -> Result<bool> {
        if candidate.len() <= self.blocks.len() {
            info!(
                "Ignoring candidate chain of {} blocks, ours has {}",
                candidate.len(),
                self.blocks.len()
            );
            return Ok(false);
        }
        if let Some(index) = Self::first_invalid_index(&candidate) {
            warn!("Ignoring candidate chain: invalid at block {index}");
            return Ok(false);
        }

        self.store.rewrite(&candidate)?;
        info!(
            "Adopted longer chain ({} -> {} blocks)",
            self.blocks.len(),
            candidate.len()
        );
        self.blocks = candidate;
        Ok(true)
    }

    /// New unmined block linked to the current tail
    pub fn prepare_candidate(&self, data: &str, media: Option<&MediaInfo>) -> Result<Block> {
        let tail = self
            .last()
            .ok_or_else(|| BlockchainError::InvalidBlock("Chain has no genesis".to_string()))?;
        Block::new(tail.get_hash().to_string(), data, media)
    }

    /// Build, mine and append a block in one step.
    ///
    /// Holds `&mut self` for the whole proof-of-work search; callers sharing
    /// the chain should mine outside their lock (see `Node::mine`).
    pub fn mine_and_append(
        &mut self,
        data: &str,
        media: Option<&MediaInfo>,
        cancel: Option<&CancelFlag>,
    ) -> Result<Block> {
        let mut block = self.prepare_candidate(data, media)?;
        match cancel {
            Some(cancel) => block.mine_with_cancel(self.difficulty, cancel)?,
            None => block.mine(self.difficulty)?,
        }
        if !self.try_append(block.clone())? {
            return Err(BlockchainError::InvalidBlock(format!(
                "Mined block {} was rejected",
                block.get_hash()
            )));
        }
        Ok(block)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    pub fn get_difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn get_store(&self) -> &ChainStore {
        &self.store
    }

    /// One serialized record per line
    pub fn dump(&self) -> String {
        self.blocks
            .iter()
            .map(|block| format!("{block}\n"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProofOfWork;
    use tempfile::{tempdir, TempDir};

    fn new_chain(difficulty: usize) -> (Chain, TempDir) {
        let dir = tempdir().unwrap();
        let store = ChainStore::new(dir.path().join("chain.txt"));
        (Chain::bootstrap(store, difficulty).unwrap(), dir)
    }

    fn mined_on(tail: &Block, data: &str) -> Block {
        let mut block = Block::new(tail.get_hash().to_string(), data, None).unwrap();
        block.mine(1).unwrap();
        block
    }

    #[test]
    fn test_bootstrap_creates_genesis() {
        let (chain, _dir) = new_chain(2);
        assert_eq!(chain.len(), 1);

        let genesis = &chain.blocks()[0];
        assert!(genesis.is_genesis());
        assert!(ProofOfWork::validate(genesis, 2));
        assert_eq!(chain.get_store().load().unwrap().len(), 1);
    }

    #[test]
    fn test_bootstrap_reuses_existing_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.txt");
        let genesis_hash = {
            let chain = Chain::bootstrap(ChainStore::new(&path), 1).unwrap();
            chain.blocks()[0].get_hash().to_string()
        };

        let reopened = Chain::bootstrap(ChainStore::new(&path), 1).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.blocks()[0].get_hash(), genesis_hash);
    }

    #[test]
    fn test_try_append_accepts_linked_block() {
        let (mut chain, _dir) = new_chain(1);
        let block = mined_on(chain.last().unwrap(), "payload");

        assert!(chain.try_append(block.clone()).unwrap());
        assert_eq!(chain.last(), Some(&block));
        assert!(chain.validate());
        assert_eq!(chain.get_store().load().unwrap().len(), 2);
    }

    #[test]
    fn test_try_append_rejects_wrong_previous_hash() {
        let (mut chain, _dir) = new_chain(1);
        let mut block = Block::new("deadbeef".to_string(), "orphan", None).unwrap();
        block.mine(1).unwrap();

        assert!(!chain.try_append(block).unwrap());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_try_append_rejects_forged_hash() {
        let (mut chain, _dir) = new_chain(1);
        let honest = mined_on(chain.last().unwrap(), "honest");
        let forged = Block::from_parts(
            honest.get_previous_hash().to_string(),
            "forged".to_string(),
            honest.get_timestamp(),
            honest.get_nonce(),
            honest.get_hash().to_string(),
            String::new(),
            String::new(),
            0,
        );

        assert!(!chain.try_append(forged).unwrap());
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.get_store().load().unwrap().len(), 1);
    }

    #[test]
    fn test_first_invalid_index_points_at_tampered_block() {
        let (mut chain, _dir) = new_chain(1);
        for i in 0..3 {
            let block = mined_on(chain.last().unwrap(), &format!("block {i}"));
            assert!(chain.try_append(block).unwrap());
        }

        let mut blocks = chain.blocks().to_vec();
        let original = &blocks[2];
        blocks[2] = Block::from_parts(
            original.get_previous_hash().to_string(),
            "tampered".to_string(),
            original.get_timestamp(),
            original.get_nonce(),
            original.get_hash().to_string(),
            String::new(),
            String::new(),
            0,
        );

        assert_eq!(Chain::first_invalid_index(&blocks), Some(2));
        assert!(!Chain::validate_blocks(&blocks));
    }

    #[test]
    fn test_genesis_must_use_sentinel() {
        let mut not_genesis = Block::new("abc".to_string(), "x", None).unwrap();
        not_genesis.mine(0).unwrap();
        assert_eq!(Chain::first_invalid_index(&[not_genesis]), Some(0));
        assert_eq!(Chain::first_invalid_index(&[]), None);
    }

    #[test]
    fn test_adopt_if_longer() {
        let (mut ours, _dir_a) = new_chain(1);
        let (mut theirs, _dir_b) = new_chain(1);
        for i in 0..2 {
            theirs.mine_and_append(&format!("theirs {i}"), None, None).unwrap();
        }

        // Same length is not enough
        let same_len = theirs.blocks()[..1].to_vec();
        assert!(!ours.adopt_if_longer(same_len).unwrap());

        assert!(ours.adopt_if_longer(theirs.blocks().to_vec()).unwrap());
        assert_eq!(ours.blocks(), theirs.blocks());
        assert_eq!(ours.get_store().load().unwrap(), theirs.blocks());
    }

    #[test]
    fn test_adopt_rejects_longer_invalid_chain() {
        let (mut ours, _dir) = new_chain(1);
        let before = ours.blocks().to_vec();

        let genesis = before[0].clone();
        let mut broken = Block::new("not-the-genesis".to_string(), "x", None).unwrap();
        broken.mine(1).unwrap();
        let candidate = vec![genesis, broken.clone(), mined_on(&broken, "y")];

        assert!(!ours.adopt_if_longer(candidate).unwrap());
        assert_eq!(ours.blocks(), before.as_slice());
    }

    #[test]
    fn test_mine_and_append_respects_cancel() {
        let (mut chain, _dir) = new_chain(0);
        chain.difficulty = 20;
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = chain.mine_and_append("never", None, Some(&cancel));
        assert!(matches!(result, Err(BlockchainError::Mining(_))));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_dump_lists_every_block() {
        let (mut chain, _dir) = new_chain(1);
        chain.mine_and_append("second", None, None).unwrap();
        let dump = chain.dump();
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.contains("second"));
    }
}
