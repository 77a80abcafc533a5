use crate::{
    block::{hash_tree_root, Block, BlockBody, BlockHeader, Eth1Data},
    Bytes32, Checkpoint, Epoch, Slot, ValidatorIndex,
};
use serde::{Deserialize, Serialize};
use ssz_derive::Ssz;

/// Beacon state snapshot as exchanged during initial sync.
///
/// Only the fields the sync engine reasons about are carried: slot tracking,
/// the latest header, the eth1 view and the two finality checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    // --- genesis ---
    pub genesis_time: u64,

    // --- slot / header tracking ---
    pub slot: Slot,
    pub latest_block_header: BlockHeader,

    // --- eth1 ---
    pub latest_eth1_data: Eth1Data,

    // --- finality checkpoints ---
    pub current_justified: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl State {
    pub fn genesis(genesis_time: u64) -> Self {
        Self {
            genesis_time,
            slot: Slot(chain::config::GENESIS_SLOT),
            latest_block_header: BlockHeader {
                slot: Slot(chain::config::GENESIS_SLOT),
                proposer_index: ValidatorIndex(0),
                parent_root: Bytes32::zero(),
                state_root: Bytes32::zero(),
                body_root: hash_tree_root(&BlockBody::default()),
            },
            latest_eth1_data: Eth1Data::default(),
            current_justified: Checkpoint::default_checkpoint(),
            finalized_checkpoint: Checkpoint::default_checkpoint(),
        }
    }

    /// Snapshot with the given finality checkpoints, used when describing
    /// remote states.
    pub fn with_finality(finalized_epoch: Epoch, justified_epoch: Epoch) -> Self {
        Self {
            slot: finalized_epoch.start_slot(),
            current_justified: Checkpoint {
                epoch: justified_epoch,
                root: Bytes32::zero(),
            },
            finalized_checkpoint: Checkpoint {
                epoch: finalized_epoch,
                root: Bytes32::zero(),
            },
            ..Self::default()
        }
    }

    pub fn finalized_epoch(&self) -> Epoch {
        self.finalized_checkpoint.epoch
    }

    pub fn justified_epoch(&self) -> Epoch {
        self.current_justified.epoch
    }

    pub fn root(&self) -> Bytes32 {
        hash_tree_root(self)
    }

    /// Post-state of applying `block` on top of this state, as far as slot and
    /// header bookkeeping are concerned.
    pub fn advanced_with(&self, block: &Block) -> State {
        State {
            slot: block.slot,
            latest_block_header: block.header(),
            latest_eth1_data: block.body.eth1_data.clone(),
            ..self.clone()
        }
    }
}
