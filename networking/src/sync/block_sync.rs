/// Block ingestion for initial sync.
///
/// Blocks are persisted strictly in chain order. A block is accepted when it
/// sits directly after the current slot, or when it builds on the block
/// accepted last; the latter lets the chain advance over empty slots.
/// Anything else is dropped and left for the request scheduler to fetch
/// again, so nothing is buffered across dispatches.
use std::time::Instant;

use anyhow::{Context, Result};
use containers::{Block, Bytes32};
use libp2p_identity::PeerId;
use tracing::{debug, info, warn};

use super::service::{InitialSync, gauge_value};
use crate::message_handler::NO_DATA_MARKER;
use crate::types::{
    BatchedBeaconBlockResponse, BeaconBlockAnnounce, BeaconBlockRequest, BeaconBlockResponse,
    OutboundP2pRequest, P2pMessage,
};

/// What happened to a single delivered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Saved,
    /// At or below the current slot.
    Duplicate,
    /// Held back until a sync target is confirmed.
    AwaitingTarget,
    OutOfOrder,
    /// Store or chain service rejected the block.
    Failed,
    /// The message carried no block.
    Malformed,
}

impl BlockOutcome {
    fn reason(&self) -> Option<&'static str> {
        match self {
            BlockOutcome::Saved => None,
            BlockOutcome::Duplicate => Some("duplicate"),
            BlockOutcome::AwaitingTarget => Some("awaiting_target"),
            BlockOutcome::OutOfOrder => Some("out_of_order"),
            BlockOutcome::Failed => Some("failed"),
            BlockOutcome::Malformed => Some("malformed"),
        }
    }
}

impl InitialSync {
    pub fn process_block(&mut self, message: &P2pMessage<BeaconBlockResponse>) -> BlockOutcome {
        let Some(response) = &message.data else {
            warn!(peer = %message.peer, "Dropping block message: {NO_DATA_MARKER}");
            return self.record_block_outcome(BlockOutcome::Malformed);
        };

        self.ingest_block(&response.block, message.peer)
    }

    /// Ingest a range response in ascending slot order.
    ///
    /// Every block is attempted; a rejected block does not stop the ones
    /// after it. Returns the number of blocks saved.
    pub fn process_batch(&mut self, message: &P2pMessage<BatchedBeaconBlockResponse>) -> usize {
        let Some(response) = &message.data else {
            warn!(peer = %message.peer, "Dropping batched block message: {NO_DATA_MARKER}");
            self.record_block_outcome(BlockOutcome::Malformed);
            return 0;
        };

        if response.batched_blocks.is_empty() {
            debug!(peer = %message.peer, "Received empty block batch");
            return 0;
        }

        let mut blocks: Vec<&Block> = response.batched_blocks.iter().collect();
        blocks.sort_by_key(|block| block.slot);

        let saved = blocks
            .into_iter()
            .map(|block| self.ingest_block(block, message.peer))
            .filter(|outcome| *outcome == BlockOutcome::Saved)
            .count();

        debug!(
            peer = %message.peer,
            received = response.batched_blocks.len(),
            saved,
            current_slot = %self.progress.current_slot(),
            "Processed block batch"
        );
        saved
    }

    /// A peer advertised a block: remember its slot and fetch it if unknown.
    pub fn process_block_announce(&mut self, message: &P2pMessage<BeaconBlockAnnounce>) {
        let Some(announce) = &message.data else {
            warn!(peer = %message.peer, "Dropping block announcement: {NO_DATA_MARKER}");
            return;
        };

        self.observe_from(announce.slot_number, message.peer);

        if self.store.has_block(&announce.hash) {
            debug!(
                hash = %announce.hash,
                slot = %announce.slot_number,
                "Announced block already known"
            );
            return;
        }

        debug!(
            hash = %announce.hash,
            slot = %announce.slot_number,
            peer = %message.peer,
            "Requesting announced block"
        );
        let request = OutboundP2pRequest::RequestBlockByHash(BeaconBlockRequest {
            hash: announce.hash,
        });
        self.send_request(request, message.peer);
    }

    fn ingest_block(&mut self, block: &Block, peer: PeerId) -> BlockOutcome {
        let root = block.root();
        let current_slot = self.progress.current_slot();

        self.observe_from(block.slot, peer);

        if block.slot <= current_slot {
            debug!(slot = %block.slot, %root, %current_slot, "Ignoring duplicate block");
            return self.record_block_outcome(BlockOutcome::Duplicate);
        }

        if self.request_state && self.target.is_none() {
            debug!(slot = %block.slot, %root, "Ignoring block until a sync target is confirmed");
            return self.record_block_outcome(BlockOutcome::AwaitingTarget);
        }

        let next_slot = block.slot == current_slot.next();
        let builds_on_head = block.parent_root == self.head_root;
        if !next_slot && !builds_on_head {
            debug!(
                slot = %block.slot,
                %root,
                parent_root = %block.parent_root,
                %current_slot,
                "Received out of order block, dropping"
            );
            return self.record_block_outcome(BlockOutcome::OutOfOrder);
        }

        let started = Instant::now();
        if let Err(error) = self.import_block(block, root) {
            warn!(slot = %block.slot, %root, peer = %peer, "Could not import block: {error:#}");
            return self.record_block_outcome(BlockOutcome::Failed);
        }

        self.progress.advance(block.slot);
        self.head_root = root;

        info!("Saved block with root {} and slot {} for initial sync", root, block.slot);

        if let Some(metrics) = &self.metrics {
            metrics.observe_block_processing_time(started.elapsed().as_secs_f64());
            metrics.set_current_slot(gauge_value(block.slot.0));
        }
        self.record_block_outcome(BlockOutcome::Saved)
    }

    fn import_block(&self, block: &Block, root: Bytes32) -> Result<()> {
        self.store
            .save_block(block)
            .with_context(|| format!("failed to save block {root}"))?;
        let state = self
            .chain
            .receive_block(block)
            .with_context(|| format!("chain service rejected block {root}"))?;
        self.chain
            .apply_fork_choice_rule(block, &state)
            .with_context(|| format!("fork choice failed for block {root}"))?;
        Ok(())
    }

    fn record_block_outcome(&self, outcome: BlockOutcome) -> BlockOutcome {
        if let Some(metrics) = &self.metrics {
            match outcome.reason() {
                Some(reason) => metrics.inc_blocks_rejected(reason),
                None => metrics.inc_blocks_saved(),
            }
        }
        outcome
    }
}
