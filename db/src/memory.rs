use std::collections::{BTreeMap, HashMap};

use containers::{Block, Bytes32, Slot, State};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::BeaconStore;

#[derive(Debug, Default)]
struct Inner {
    blocks: HashMap<Bytes32, Block>,
    /// Canonical chain: slot -> block root, maintained by `update_chain_head`.
    canonical: BTreeMap<Slot, Bytes32>,
    head: Option<Bytes32>,
    state: Option<State>,
    justified: Option<Block>,
    finalized: Option<Block>,
}

/// Store kept entirely in memory, safe for one writer plus concurrent readers.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a genesis state and its genesis block, and make
    /// that block the chain head.
    pub fn initialize(&self, genesis_time: u64) -> Result<Block> {
        let state = State::genesis(genesis_time);
        let genesis = Block::genesis(state.root());

        self.save_state(&state)?;
        self.save_block(&genesis)?;
        self.update_chain_head(&genesis, &state)?;
        self.save_justified_block(&genesis)?;
        self.save_finalized_block(&genesis)?;

        debug!(root = %genesis.root(), genesis_time, "Initialized store from genesis");
        Ok(genesis)
    }

    pub fn block_count(&self) -> usize {
        self.inner.read().blocks.len()
    }
}

impl BeaconStore for InMemoryStore {
    fn save_block(&self, block: &Block) -> Result<()> {
        let root = block.root();
        self.inner.write().blocks.insert(root, block.clone());
        Ok(())
    }

    fn block(&self, root: &Bytes32) -> Result<Option<Block>> {
        Ok(self.inner.read().blocks.get(root).cloned())
    }

    fn has_block(&self, root: &Bytes32) -> bool {
        self.inner.read().blocks.contains_key(root)
    }

    fn block_by_slot(&self, slot: Slot) -> Result<Option<Block>> {
        let inner = self.inner.read();
        Ok(inner
            .canonical
            .get(&slot)
            .and_then(|root| inner.blocks.get(root))
            .cloned())
    }

    fn update_chain_head(&self, block: &Block, state: &State) -> Result<()> {
        let root = block.root();
        let mut inner = self.inner.write();

        if !inner.blocks.contains_key(&root) {
            return Err(StoreError::BlockNotFound { root });
        }

        // A new head invalidates any canonical entries above it.
        let stale: Vec<Slot> = inner
            .canonical
            .range(block.slot.next()..)
            .map(|(slot, _)| *slot)
            .collect();
        for slot in stale {
            inner.canonical.remove(&slot);
        }

        inner.canonical.insert(block.slot, root);
        inner.head = Some(root);
        inner.state = Some(state.clone());
        Ok(())
    }

    fn chain_head(&self) -> Result<Block> {
        let inner = self.inner.read();
        inner
            .head
            .and_then(|root| inner.blocks.get(&root))
            .cloned()
            .ok_or(StoreError::NoChainHead)
    }

    fn save_state(&self, state: &State) -> Result<()> {
        self.inner.write().state = Some(state.clone());
        Ok(())
    }

    fn state(&self) -> Result<Option<State>> {
        Ok(self.inner.read().state.clone())
    }

    fn save_justified_block(&self, block: &Block) -> Result<()> {
        self.inner.write().justified = Some(block.clone());
        Ok(())
    }

    fn justified_block(&self) -> Result<Block> {
        self.inner
            .read()
            .justified
            .clone()
            .ok_or(StoreError::NoneSaved { kind: "justified" })
    }

    fn save_finalized_block(&self, block: &Block) -> Result<()> {
        self.inner.write().finalized = Some(block.clone());
        Ok(())
    }

    fn finalized_block(&self) -> Result<Block> {
        self.inner
            .read()
            .finalized
            .clone()
            .ok_or(StoreError::NoneSaved { kind: "finalized" })
    }
}
