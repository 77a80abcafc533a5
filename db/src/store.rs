use containers::{Block, Bytes32, Slot, State};

use crate::error::Result;

/// Block and state storage used by initial sync.
///
/// Lookups of absent keys return `Ok(None)`; only backend faults and
/// contract violations are errors. During a sync run blocks are only ever
/// appended, never deleted.
pub trait BeaconStore: Send + Sync {
    fn save_block(&self, block: &Block) -> Result<()>;

    fn block(&self, root: &Bytes32) -> Result<Option<Block>>;

    fn has_block(&self, root: &Bytes32) -> bool;

    /// Canonical block at `slot`, resolved through the chain head history.
    fn block_by_slot(&self, slot: Slot) -> Result<Option<Block>>;

    fn has_block_by_slot(&self, slot: Slot) -> Result<bool> {
        Ok(self.block_by_slot(slot)?.is_some())
    }

    /// Record `block` as the new canonical head, with `state` as its post-state.
    ///
    /// Fails with [`StoreError::BlockNotFound`](crate::StoreError::BlockNotFound)
    /// when `block` has not been saved first.
    fn update_chain_head(&self, block: &Block, state: &State) -> Result<()>;

    fn chain_head(&self) -> Result<Block>;

    fn save_state(&self, state: &State) -> Result<()>;

    fn state(&self) -> Result<Option<State>>;

    fn save_justified_block(&self, block: &Block) -> Result<()>;

    fn justified_block(&self) -> Result<Block>;

    fn save_finalized_block(&self, block: &Block) -> Result<()>;

    fn finalized_block(&self) -> Result<Block>;
}
