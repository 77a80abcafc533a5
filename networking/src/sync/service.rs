use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use containers::{Block, Bytes32, Epoch, Slot, State};
use db::BeaconStore;
use libp2p_identity::PeerId;
use metrics::Metrics;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    config::SyncSettings, state_sync::SyncTarget, states::SyncState, tracker::ChainProgress,
};
use crate::message_handler::{HandleOutcome, safely_handle_message};
use crate::types::{
    BatchedBeaconBlockResponse, BeaconBlockAnnounce, BeaconBlockResponse, BeaconStateResponse,
    InboundSender, P2pMessage, P2pTransport, Subscription,
};

/// Block import as seen by initial sync.
pub trait ChainService: Send + Sync {
    /// Apply `block` and return its post-state.
    fn receive_block(&self, block: &Block) -> Result<State>;

    fn apply_fork_choice_rule(&self, block: &Block, state: &State) -> Result<()>;
}

/// Regular sync, started once initial sync catches up.
pub trait SteadyStateSync: Send + Sync {
    fn resume_sync(&self);
}

#[derive(Clone)]
pub struct InitialSyncConfig {
    pub transport: Arc<dyn P2pTransport>,
    pub store: Arc<dyn BeaconStore>,
    pub chain: Arc<dyn ChainService>,
    pub steady_state: Arc<dyn SteadyStateSync>,
    pub settings: SyncSettings,
    pub metrics: Option<Arc<Metrics>>,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    CaughtUp,
    Cancelled,
}

/// Snapshot published after every dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncProgress {
    pub state: SyncState,
    pub current_slot: Slot,
    pub highest_observed_slot: Slot,
    pub target_finalized_epoch: Option<Epoch>,
}

struct Inbound {
    blocks: mpsc::Receiver<P2pMessage<BeaconBlockResponse>>,
    batched_blocks: mpsc::Receiver<P2pMessage<BatchedBeaconBlockResponse>>,
    announces: mpsc::Receiver<P2pMessage<BeaconBlockAnnounce>>,
    states: mpsc::Receiver<P2pMessage<BeaconStateResponse>>,
}

/// Tracks which inputs of the run loop can still deliver.
#[derive(Debug, Clone, Copy)]
struct OpenInputs {
    blocks: bool,
    batched_blocks: bool,
    announces: bool,
    states: bool,
    ticks: bool,
}

impl OpenInputs {
    fn all() -> Self {
        Self {
            blocks: true,
            batched_blocks: true,
            announces: true,
            states: true,
            ticks: true,
        }
    }

    fn any(&self) -> bool {
        self.blocks || self.batched_blocks || self.announces || self.states || self.ticks
    }
}

/// Initial sync engine.
///
/// Owns the chain progress, the sync target and the head root; every
/// mutation happens on the task running [`InitialSync::run`], one message at
/// a time, so none of them need a lock.
pub struct InitialSync {
    pub(super) transport: Arc<dyn P2pTransport>,
    pub(super) store: Arc<dyn BeaconStore>,
    pub(super) chain: Arc<dyn ChainService>,
    steady_state: Arc<dyn SteadyStateSync>,
    pub(super) metrics: Option<Arc<Metrics>>,
    pub(super) request_state: bool,
    sync_interval: Duration,

    pub(super) state: SyncState,
    pub(super) progress: ChainProgress,
    pub(super) target: Option<SyncTarget>,
    pub(super) head_root: Bytes32,
    /// Peer that delivered the highest slot seen so far.
    pub(super) best_peer: Option<PeerId>,

    inbound: Inbound,
    subscriptions: Vec<Subscription>,
    progress_tx: watch::Sender<SyncProgress>,
    token: CancellationToken,
}

impl InitialSync {
    /// Build the engine on top of the store's current chain head and
    /// subscribe its inbound channels with the transport.
    pub fn new(config: InitialSyncConfig) -> Result<Self> {
        let InitialSyncConfig {
            transport,
            store,
            chain,
            steady_state,
            settings,
            metrics,
        } = config;

        settings.validate()?;

        let head = store
            .chain_head()
            .context("initial sync requires a chain head in the store")?;
        let head_root = head.root();

        let (block_tx, blocks) = mpsc::channel(settings.block_buffer_size);
        let (batched_tx, batched_blocks) = mpsc::channel(settings.batched_block_buffer_size);
        let (announce_tx, announces) = mpsc::channel(settings.block_announce_buffer_size);
        let (state_tx, states) = mpsc::channel(settings.state_buffer_size);

        let subscriptions = vec![
            transport.subscribe(InboundSender::BeaconBlock(block_tx)),
            transport.subscribe(InboundSender::BatchedBeaconBlocks(batched_tx)),
            transport.subscribe(InboundSender::BeaconBlockAnnounce(announce_tx)),
            transport.subscribe(InboundSender::BeaconState(state_tx)),
        ];

        let progress = ChainProgress::new(head.slot);
        let (progress_tx, _) = watch::channel(SyncProgress {
            state: SyncState::default(),
            current_slot: progress.current_slot(),
            highest_observed_slot: progress.highest_observed_slot(),
            target_finalized_epoch: None,
        });

        info!(
            head_slot = %head.slot,
            head_root = %head_root,
            request_state = settings.request_state,
            "Initial sync created"
        );

        Ok(Self {
            transport,
            store,
            chain,
            steady_state,
            metrics,
            request_state: settings.request_state,
            sync_interval: settings.sync_interval(),
            state: SyncState::default(),
            progress,
            target: None,
            head_root,
            best_peer: None,
            inbound: Inbound {
                blocks,
                batched_blocks,
                announces,
                states,
            },
            subscriptions,
            progress_tx,
            token: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn progress(&self) -> ChainProgress {
        self.progress
    }

    pub fn target(&self) -> Option<&SyncTarget> {
        self.target.as_ref()
    }

    pub fn head_root(&self) -> Bytes32 {
        self.head_root
    }

    /// Token that stops the run loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress_tx.subscribe()
    }

    /// Catch-up needs a confirmed target when a state was requested first.
    pub fn is_caught_up(&self) -> bool {
        self.progress.is_caught_up() && (!self.request_state || self.target.is_some())
    }

    pub(super) fn transition(&mut self, target: SyncState) {
        if self.state == target {
            return;
        }
        if !self.state.can_transition_to(target) {
            warn!(
                from = ?self.state,
                to = ?target,
                "Invalid state transition attempted"
            );
            return;
        }
        debug!(from = ?self.state, to = ?target, "Initial sync state transition");
        self.state = target;
    }

    /// Raise the highest observed slot, remembering `peer` when it raised it.
    pub(super) fn observe_from(&mut self, slot: Slot, peer: PeerId) {
        if self.progress.observe(slot) {
            self.best_peer = Some(peer);
            if let Some(metrics) = &self.metrics {
                metrics.set_highest_observed_slot(gauge_value(slot.0));
            }
        }
    }

    /// Spawn a ticker at the configured interval and run until done.
    pub async fn start(mut self) -> SyncOutcome {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        let interval = self.sync_interval;
        let token = self.token.clone();

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tick_tx.send(()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let outcome = self.run(tick_rx).await;
        ticker.abort();
        outcome
    }

    /// Multiplex inbound messages, ticks and cancellation until the engine
    /// catches up or is cancelled.
    pub async fn run(&mut self, mut ticks: mpsc::Receiver<()>) -> SyncOutcome {
        let token = self.token.clone();
        let mut open = OpenInputs::all();

        loop {
            if token.is_cancelled() {
                return self.stop(SyncOutcome::Cancelled);
            }

            tokio::select! {
                _ = token.cancelled() => {
                    return self.stop(SyncOutcome::Cancelled);
                }
                message = self.inbound.blocks.recv(), if open.blocks => match message {
                    Some(message) => {
                        let outcome = safely_handle_message(|m| { self.process_block(m); }, &message);
                        self.count_panic(&outcome);
                    }
                    None => open.blocks = false,
                },
                message = self.inbound.batched_blocks.recv(), if open.batched_blocks => match message {
                    Some(message) => {
                        let outcome = safely_handle_message(|m| { self.process_batch(m); }, &message);
                        self.count_panic(&outcome);
                    }
                    None => open.batched_blocks = false,
                },
                message = self.inbound.announces.recv(), if open.announces => match message {
                    Some(message) => {
                        let outcome = safely_handle_message(|m| self.process_block_announce(m), &message);
                        self.count_panic(&outcome);
                    }
                    None => open.announces = false,
                },
                message = self.inbound.states.recv(), if open.states => match message {
                    Some(message) => {
                        let outcome = safely_handle_message(|m| { self.process_state(m); }, &message);
                        self.count_panic(&outcome);
                    }
                    None => open.states = false,
                },
                tick = ticks.recv(), if open.ticks => match tick {
                    Some(()) => {
                        if let Some(outcome) = self.on_tick() {
                            return self.stop(outcome);
                        }
                    }
                    None => open.ticks = false,
                },
            }

            if !open.any() {
                debug!("All initial sync inputs closed");
                return self.stop(SyncOutcome::Cancelled);
            }

            self.publish_progress();
        }
    }

    /// Evaluate catch-up; otherwise issue whatever requests are due.
    fn on_tick(&mut self) -> Option<SyncOutcome> {
        if self.is_caught_up() {
            info!(
                slot = %self.progress.current_slot(),
                "Exiting initial sync and starting normal sync"
            );
            self.transition(SyncState::CaughtUp);
            self.steady_state.resume_sync();
            return Some(SyncOutcome::CaughtUp);
        }

        self.request_missing();
        None
    }

    fn stop(&mut self, outcome: SyncOutcome) -> SyncOutcome {
        if outcome == SyncOutcome::Cancelled {
            info!(
                current_slot = %self.progress.current_slot(),
                highest_observed_slot = %self.progress.highest_observed_slot(),
                "Initial sync stopped"
            );
        }
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        self.publish_progress();
        outcome
    }

    fn publish_progress(&self) {
        let snapshot = SyncProgress {
            state: self.state,
            current_slot: self.progress.current_slot(),
            highest_observed_slot: self.progress.highest_observed_slot(),
            target_finalized_epoch: self.target.as_ref().map(|target| target.finalized_epoch),
        };
        self.progress_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn count_panic(&self, outcome: &HandleOutcome) {
        if outcome.is_recovered() {
            if let Some(metrics) = &self.metrics {
                metrics.inc_handler_panics();
            }
        }
    }
}

/// Prometheus gauges are signed; values past `i64::MAX` pin to it.
pub(super) fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
