/// Initial sync for the beacon node.
///
/// Brings a freshly started node from its local chain head up to the
/// network's head before regular sync takes over. It includes:
///
/// - **Chain Progress**: Tracks the contiguous local slot against the highest slot seen
/// - **Block Sync**: Persists delivered blocks in chain order
/// - **State Sync**: Picks the most advanced finalized state as sync target
/// - **Requests**: Re-requests missing slot ranges on every tick
/// - **Service**: Run loop owning all of the above
///
/// ## Architecture
///
/// The engine is a single task fed by bounded channels:
/// 1. The transport delivers blocks, batches, announcements and states
/// 2. Each message is handled under panic containment
/// 3. Handlers update chain progress and write to the store
/// 4. On each tick the engine either hands off or requests what is missing
///
/// ## State Machine
///
/// - **REQUESTING**: No sync target confirmed yet
/// - **SYNCING**: Target confirmed, filling in blocks
/// - **CAUGHT_UP**: Local progress reached the highest observed slot
pub mod block_sync;
pub mod config;
pub mod requests;
pub mod service;
pub mod state_sync;
pub mod states;
pub mod tracker;

pub use block_sync::BlockOutcome;
pub use config::*;
pub use service::{
    ChainService, InitialSync, InitialSyncConfig, SteadyStateSync, SyncOutcome, SyncProgress,
};
pub use state_sync::{StateOutcome, SyncTarget};
pub use states::SyncState;
pub use tracker::ChainProgress;

#[cfg(test)]
mod tests;
