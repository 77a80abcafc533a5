/// Request scheduling for initial sync.
///
/// Requests are fire-and-forget: answers come back through the inbound
/// channels like any unsolicited delivery, and whatever is still missing on
/// the next tick is simply asked for again.
use containers::{Bytes32, Slot};
use libp2p_identity::PeerId;
use tracing::{debug, warn};

use super::config::MAX_BLOCKS_PER_REQUEST;
use super::service::InitialSync;
use crate::types::{BatchedBeaconBlockRequest, BeaconStateRequest, OutboundP2pRequest};

impl InitialSync {
    /// Issue the requests due on a tick that did not end the run.
    pub fn request_missing(&mut self) {
        if self.request_state && self.target.is_none() {
            self.request_sync_target();
            return;
        }

        if let Some(request) = self.next_range_request() {
            let request = OutboundP2pRequest::RequestBlocksByRange(request);
            match self.best_peer {
                Some(peer) => {
                    if !self.send_request(request.clone(), peer) {
                        // Unreachable best peer: forget it and ask everyone.
                        self.best_peer = None;
                        self.broadcast_request(request);
                    }
                }
                None => self.broadcast_request(request),
            }
        }
    }

    /// Range covering the start of the current gap, at most
    /// `MAX_BLOCKS_PER_REQUEST` slots long.
    pub fn next_range_request(&self) -> Option<BatchedBeaconBlockRequest> {
        let gap = self.progress.gap()?;
        let start_slot = *gap.start();
        let window_end = Slot(
            start_slot
                .0
                .saturating_add(MAX_BLOCKS_PER_REQUEST.saturating_sub(1)),
        );

        Some(BatchedBeaconBlockRequest {
            start_slot,
            end_slot: (*gap.end()).min(window_end),
        })
    }

    fn request_sync_target(&self) {
        let finalized_state_root = match self.store.finalized_block() {
            Ok(block) => block.state_root,
            Err(error) => {
                debug!("No finalized block to anchor state request: {error}");
                Bytes32::zero()
            }
        };

        self.broadcast_request(OutboundP2pRequest::RequestState(BeaconStateRequest {
            finalized_state_root,
        }));
    }

    /// Returns whether the transport accepted the request.
    pub(super) fn send_request(&self, request: OutboundP2pRequest, peer: PeerId) -> bool {
        debug!(%request, %peer, "Sending sync request");
        let kind = request.kind();
        match self.transport.send(request, peer) {
            Ok(()) => {
                self.count_request(kind);
                true
            }
            Err(error) => {
                warn!(%peer, "Could not send {kind} request: {error:#}");
                false
            }
        }
    }

    fn broadcast_request(&self, request: OutboundP2pRequest) {
        debug!(%request, "Broadcasting sync request");
        let kind = request.kind();
        self.transport.broadcast(request);
        self.count_request(kind);
    }

    fn count_request(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_requests_sent(kind);
        }
    }
}
