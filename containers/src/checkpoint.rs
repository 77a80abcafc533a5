use crate::{Bytes32, Epoch};
use serde::{Deserialize, Serialize};
use ssz_derive::Ssz;

/// Represents a checkpoint in the chain's history.
///
/// A checkpoint pairs an epoch with the root of the block at that epoch's
/// boundary. Justification and finalization are tracked as checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The epoch of the checkpoint.
    pub epoch: Epoch,
    /// The root hash of the checkpoint's block.
    pub root: Bytes32,
}

impl Checkpoint {
    /// Return a default checkpoint with zero root at epoch 0.
    pub fn default_checkpoint() -> Self {
        Self {
            epoch: Epoch(0),
            root: Bytes32(ssz::H256::zero()),
        }
    }
}
