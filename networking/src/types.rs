use std::fmt::{self, Display};

use anyhow::{Result, anyhow};
use containers::{Block, Bytes32, Slot, State};
use libp2p_identity::PeerId;
use serde::Serialize;
use ssz_derive::Ssz;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Span, field};

/// An inbound network delivery.
///
/// `data` is `None` when the transport handed over a message without payload;
/// such messages are malformed and dropped by every handler. `span` plays the
/// role of the request context: it is entered while the message is handled and
/// carries failure information when the handler panics.
#[derive(Debug, Clone)]
pub struct P2pMessage<T> {
    pub peer: PeerId,
    pub data: Option<T>,
    pub span: Span,
}

impl<T> P2pMessage<T> {
    pub fn new(peer: PeerId, data: T) -> Self {
        Self {
            peer,
            data: Some(data),
            span: message_span(&peer),
        }
    }

    /// A delivery that carries no payload.
    pub fn empty(peer: PeerId) -> Self {
        Self {
            peer,
            data: None,
            span: message_span(&peer),
        }
    }
}

fn message_span(peer: &PeerId) -> Span {
    tracing::debug_span!(
        "p2p_message",
        peer = %peer,
        otel.status_code = field::Empty,
        error = field::Empty,
    )
}

/// A single block delivered in response to a request or unsolicited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconBlockResponse {
    pub block: Block,
}

/// Consecutive blocks delivered in response to a range request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchedBeaconBlockResponse {
    pub batched_blocks: Vec<Block>,
}

/// A peer advertising that it holds a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconBlockAnnounce {
    pub hash: Bytes32,
    pub slot_number: Slot,
}

/// A state snapshot offered as sync target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconStateResponse {
    pub beacon_state: State,
}

/// Request for the canonical blocks in `[start_slot, end_slot]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ssz, Default, Serialize)]
pub struct BatchedBeaconBlockRequest {
    pub start_slot: Slot,
    pub end_slot: Slot,
}

impl BatchedBeaconBlockRequest {
    /// Number of slots covered, inclusive of both ends.
    pub fn len(&self) -> u64 {
        if self.end_slot < self.start_slot {
            0
        } else {
            self.end_slot.0 - self.start_slot.0 + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request for a single block by root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ssz, Default, Serialize)]
pub struct BeaconBlockRequest {
    pub hash: Bytes32,
}

/// Request for the state a peer considers its finalized sync target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ssz, Default, Serialize)]
pub struct BeaconStateRequest {
    pub finalized_state_root: Bytes32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundP2pRequest {
    RequestBlocksByRange(BatchedBeaconBlockRequest),
    RequestBlockByHash(BeaconBlockRequest),
    RequestState(BeaconStateRequest),
}

impl OutboundP2pRequest {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundP2pRequest::RequestBlocksByRange(_) => "blocks_by_range",
            OutboundP2pRequest::RequestBlockByHash(_) => "block_by_hash",
            OutboundP2pRequest::RequestState(_) => "state",
        }
    }
}

impl Display for OutboundP2pRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundP2pRequest::RequestBlocksByRange(request) => write!(
                f,
                "RequestBlocksByRange(start={}, end={})",
                request.start_slot, request.end_slot
            ),
            OutboundP2pRequest::RequestBlockByHash(request) => {
                write!(f, "RequestBlockByHash(hash={})", request.hash)
            }
            OutboundP2pRequest::RequestState(request) => write!(
                f,
                "RequestState(finalized_state_root={})",
                request.finalized_state_root
            ),
        }
    }
}

/// Inbound message kinds the sync engine listens to.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    BeaconBlock,
    BatchedBeaconBlocks,
    BeaconBlockAnnounce,
    BeaconState,
}

impl Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Topic::BeaconBlock => "beacon_block",
            Topic::BatchedBeaconBlocks => "batched_beacon_blocks",
            Topic::BeaconBlockAnnounce => "beacon_block_announce",
            Topic::BeaconState => "beacon_state",
        })
    }
}

/// Channel a transport delivers one topic's messages into.
///
/// The channels are bounded: a transport that outpaces the engine waits on
/// `send().await` instead of dropping deliveries.
#[derive(Debug, Clone)]
pub enum InboundSender {
    BeaconBlock(mpsc::Sender<P2pMessage<BeaconBlockResponse>>),
    BatchedBeaconBlocks(mpsc::Sender<P2pMessage<BatchedBeaconBlockResponse>>),
    BeaconBlockAnnounce(mpsc::Sender<P2pMessage<BeaconBlockAnnounce>>),
    BeaconState(mpsc::Sender<P2pMessage<BeaconStateResponse>>),
}

impl InboundSender {
    pub fn topic(&self) -> Topic {
        match self {
            InboundSender::BeaconBlock(_) => Topic::BeaconBlock,
            InboundSender::BatchedBeaconBlocks(_) => Topic::BatchedBeaconBlocks,
            InboundSender::BeaconBlockAnnounce(_) => Topic::BeaconBlockAnnounce,
            InboundSender::BeaconState(_) => Topic::BeaconState,
        }
    }
}

/// Handle to an active subscription. Transports stop delivering once it is
/// cancelled.
#[derive(Debug, Clone)]
pub struct Subscription {
    topic: Topic,
    token: CancellationToken,
}

impl Subscription {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            token: CancellationToken::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

/// Peer-to-peer transport as seen by initial sync.
///
/// The engine only consumes deliveries and emits requests; discovery and
/// scoring stay with the transport.
pub trait P2pTransport: Send + Sync {
    fn subscribe(&self, sender: InboundSender) -> Subscription;

    fn broadcast(&self, request: OutboundP2pRequest);

    fn send(&self, request: OutboundP2pRequest, peer: PeerId) -> Result<()>;
}

/// Outbound-only transport: requests are queued for a network service that
/// drains the receiving end. Nothing is ever delivered back.
impl P2pTransport for mpsc::UnboundedSender<OutboundP2pRequest> {
    fn subscribe(&self, sender: InboundSender) -> Subscription {
        Subscription::new(sender.topic())
    }

    fn broadcast(&self, request: OutboundP2pRequest) {
        if let Err(mpsc::error::SendError(request)) = mpsc::UnboundedSender::send(self, request) {
            tracing::warn!(%request, "Outbound request queue closed, dropping broadcast");
        }
    }

    fn send(&self, request: OutboundP2pRequest, peer: PeerId) -> Result<()> {
        mpsc::UnboundedSender::send(self, request)
            .map_err(|err| anyhow!("failed to queue request for peer {peer}: {}", err.0))
    }
}
