pub mod types;
pub mod slot;
pub mod checkpoint;
pub mod block;
pub mod state;

pub use block::{hash_tree_root, Block, BlockBody, BlockHeader, Eth1Data};
pub use checkpoint::Checkpoint;
pub use slot::{Epoch, Slot};
pub use state::State;
pub use types::{Bytes32, Uint64, ValidatorIndex};
pub use ssz;
