use crate::{Bytes32, Slot, ValidatorIndex};
use serde::{Deserialize, Serialize};
use ssz_derive::Ssz;

/// Deposit-contract view carried by every block.
#[derive(Clone, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eth1Data {
    pub deposit_root: Bytes32,
    pub block_hash: Bytes32,
}

/// The body of a block, containing payload data.
#[derive(Clone, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBody {
    pub randao_reveal: Bytes32,
    pub eth1_data: Eth1Data,
}

#[derive(Clone, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: Bytes32,
    pub state_root: Bytes32,
    pub body_root: Bytes32,
}

#[derive(Clone, Debug, PartialEq, Eq, Ssz, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: Bytes32,
    pub state_root: Bytes32,
    pub body: BlockBody,
}

/// Compute the SSZ hash tree root for any type implementing `SszHash`.
pub fn hash_tree_root<T: ssz::SszHash>(value: &T) -> Bytes32 {
    let h = value.hash_tree_root();
    Bytes32(h)
}

impl Block {
    /// Genesis block committing to the given genesis state root.
    pub fn genesis(state_root: Bytes32) -> Self {
        Self {
            slot: Slot(chain::config::GENESIS_SLOT),
            proposer_index: ValidatorIndex(0),
            parent_root: Bytes32::zero(),
            state_root,
            body: BlockBody::default(),
        }
    }

    /// Canonical root identifying this block.
    pub fn root(&self) -> Bytes32 {
        hash_tree_root(self)
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: hash_tree_root(&self.body),
        }
    }
}
