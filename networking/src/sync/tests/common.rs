use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use containers::{Block, Bytes32, Epoch, Slot, State};
use db::error::Result as StoreResult;
use db::{BeaconStore, InMemoryStore, StoreError};
use libp2p_identity::PeerId;
use metrics::Metrics;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::sync::{ChainService, InitialSync, InitialSyncConfig, SteadyStateSync, SyncSettings};
use crate::types::{
    BatchedBeaconBlockResponse, BeaconBlockResponse, BeaconStateResponse,
    InboundSender, OutboundP2pRequest, P2pMessage, P2pTransport, Subscription,
};

/// Transport that hands out the engine's inbound senders and records every
/// outbound request.
#[derive(Default)]
pub struct RecordingTransport {
    inbound: Mutex<Vec<InboundSender>>,
    subscriptions: Mutex<Vec<Subscription>>,
    broadcasts: Mutex<Vec<OutboundP2pRequest>>,
    sent: Mutex<Vec<(OutboundP2pRequest, PeerId)>>,
    fail_sends: bool,
}

impl RecordingTransport {
    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    pub fn broadcasts(&self) -> Vec<OutboundP2pRequest> {
        self.broadcasts.lock().clone()
    }

    pub fn sent(&self) -> Vec<(OutboundP2pRequest, PeerId)> {
        self.sent.lock().clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().clone()
    }

    pub fn block_sender(&self) -> mpsc::Sender<P2pMessage<BeaconBlockResponse>> {
        self.inbound
            .lock()
            .iter()
            .find_map(|sender| match sender {
                InboundSender::BeaconBlock(tx) => Some(tx.clone()),
                _ => None,
            })
            .expect("block channel subscribed")
    }

    pub fn batch_sender(&self) -> mpsc::Sender<P2pMessage<BatchedBeaconBlockResponse>> {
        self.inbound
            .lock()
            .iter()
            .find_map(|sender| match sender {
                InboundSender::BatchedBeaconBlocks(tx) => Some(tx.clone()),
                _ => None,
            })
            .expect("batched block channel subscribed")
    }

    pub fn state_sender(&self) -> mpsc::Sender<P2pMessage<BeaconStateResponse>> {
        self.inbound
            .lock()
            .iter()
            .find_map(|sender| match sender {
                InboundSender::BeaconState(tx) => Some(tx.clone()),
                _ => None,
            })
            .expect("state channel subscribed")
    }

    /// Drop every inbound sender so the engine sees its channels close.
    pub fn close_inbound(&self) {
        self.inbound.lock().clear();
    }
}

impl P2pTransport for RecordingTransport {
    fn subscribe(&self, sender: InboundSender) -> Subscription {
        let subscription = Subscription::new(sender.topic());
        self.inbound.lock().push(sender);
        self.subscriptions.lock().push(subscription.clone());
        subscription
    }

    fn broadcast(&self, request: OutboundP2pRequest) {
        self.broadcasts.lock().push(request);
    }

    fn send(&self, request: OutboundP2pRequest, peer: PeerId) -> Result<()> {
        if self.fail_sends {
            return Err(anyhow!("peer {peer} disconnected"));
        }
        self.sent.lock().push((request, peer));
        Ok(())
    }
}

/// Chain service backed by the store: every imported block becomes the head.
pub struct MockChainService {
    store: Arc<dyn BeaconStore>,
    /// Panics while importing the block at this slot.
    panic_at: Option<Slot>,
}

impl MockChainService {
    pub fn new(store: Arc<dyn BeaconStore>) -> Self {
        Self {
            store,
            panic_at: None,
        }
    }

    pub fn panicking_at(store: Arc<dyn BeaconStore>, slot: Slot) -> Self {
        Self {
            store,
            panic_at: Some(slot),
        }
    }
}

impl ChainService for MockChainService {
    fn receive_block(&self, block: &Block) -> Result<State> {
        if self.panic_at == Some(block.slot) {
            panic!("state transition failed at slot {}", block.slot);
        }
        let pre_state = self.store.state()?.unwrap_or_default();
        Ok(pre_state.advanced_with(block))
    }

    fn apply_fork_choice_rule(&self, block: &Block, state: &State) -> Result<()> {
        self.store.update_chain_head(block, state)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSteadyState {
    resumed: AtomicUsize,
}

impl RecordingSteadyState {
    pub fn resume_count(&self) -> usize {
        self.resumed.load(Ordering::SeqCst)
    }
}

impl SteadyStateSync for RecordingSteadyState {
    fn resume_sync(&self) {
        self.resumed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store whose block writes always fail.
pub struct FaultyStore {
    inner: InMemoryStore,
}

impl FaultyStore {
    pub fn new() -> Self {
        let inner = InMemoryStore::new();
        inner.initialize(0).expect("genesis");
        Self { inner }
    }
}

impl BeaconStore for FaultyStore {
    fn save_block(&self, _block: &Block) -> StoreResult<()> {
        Err(StoreError::Backend("disk full".to_owned()))
    }

    fn block(&self, root: &Bytes32) -> StoreResult<Option<Block>> {
        self.inner.block(root)
    }

    fn has_block(&self, root: &Bytes32) -> bool {
        self.inner.has_block(root)
    }

    fn block_by_slot(&self, slot: Slot) -> StoreResult<Option<Block>> {
        self.inner.block_by_slot(slot)
    }

    fn update_chain_head(&self, block: &Block, state: &State) -> StoreResult<()> {
        self.inner.update_chain_head(block, state)
    }

    fn chain_head(&self) -> StoreResult<Block> {
        self.inner.chain_head()
    }

    fn save_state(&self, _state: &State) -> StoreResult<()> {
        Err(StoreError::Backend("disk full".to_owned()))
    }

    fn state(&self) -> StoreResult<Option<State>> {
        self.inner.state()
    }

    fn save_justified_block(&self, block: &Block) -> StoreResult<()> {
        self.inner.save_justified_block(block)
    }

    fn justified_block(&self) -> StoreResult<Block> {
        self.inner.justified_block()
    }

    fn save_finalized_block(&self, block: &Block) -> StoreResult<()> {
        self.inner.save_finalized_block(block)
    }

    fn finalized_block(&self) -> StoreResult<Block> {
        self.inner.finalized_block()
    }
}

pub struct Harness {
    pub store: Arc<dyn BeaconStore>,
    pub transport: Arc<RecordingTransport>,
    pub steady_state: Arc<RecordingSteadyState>,
    pub metrics: Arc<Metrics>,
    pub genesis: Block,
}

impl Harness {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let genesis = store.initialize(0).expect("genesis");
        Self::with_store(Arc::new(store), genesis)
    }

    pub fn with_store(store: Arc<dyn BeaconStore>, genesis: Block) -> Self {
        Self {
            store,
            transport: Arc::new(RecordingTransport::default()),
            steady_state: Arc::new(RecordingSteadyState::default()),
            metrics: Arc::new(Metrics::new()),
            genesis,
        }
    }

    pub fn config(&self, settings: SyncSettings) -> InitialSyncConfig {
        InitialSyncConfig {
            transport: self.transport.clone(),
            store: self.store.clone(),
            chain: Arc::new(MockChainService::new(self.store.clone())),
            steady_state: self.steady_state.clone(),
            settings,
            metrics: Some(self.metrics.clone()),
        }
    }

    pub fn sync(&self) -> InitialSync {
        self.sync_with(SyncSettings::default())
    }

    pub fn sync_with(&self, settings: SyncSettings) -> InitialSync {
        InitialSync::new(self.config(settings)).expect("initial sync")
    }

    pub fn state_first(&self) -> InitialSync {
        self.sync_with(SyncSettings {
            request_state: true,
            ..SyncSettings::default()
        })
    }
}

/// Blocks at `slots`, each built on the one before it, starting from `parent`.
pub fn chain_from(parent: &Block, slots: impl IntoIterator<Item = u64>) -> Vec<Block> {
    let mut parent_root = parent.root();
    slots
        .into_iter()
        .map(|slot| {
            let block = Block {
                slot: Slot(slot),
                parent_root,
                ..Block::default()
            };
            parent_root = block.root();
            block
        })
        .collect()
}

/// Block at `slot` that does not build on anything we hold.
pub fn detached_block(slot: u64) -> Block {
    Block {
        slot: Slot(slot),
        parent_root: Bytes32::with_first_byte(0xee),
        ..Block::default()
    }
}

pub fn block_message(block: Block) -> P2pMessage<BeaconBlockResponse> {
    P2pMessage::new(PeerId::random(), BeaconBlockResponse { block })
}

pub fn batch_message(blocks: Vec<Block>) -> P2pMessage<BatchedBeaconBlockResponse> {
    P2pMessage::new(
        PeerId::random(),
        BatchedBeaconBlockResponse {
            batched_blocks: blocks,
        },
    )
}

pub fn state_message(finalized: u64, justified: u64) -> P2pMessage<BeaconStateResponse> {
    P2pMessage::new(
        PeerId::random(),
        BeaconStateResponse {
            beacon_state: State::with_finality(Epoch(finalized), Epoch(justified)),
        },
    )
}
