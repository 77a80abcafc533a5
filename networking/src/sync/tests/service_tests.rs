use std::sync::Arc;
use std::time::Duration;

use containers::Slot;
use libp2p_identity::PeerId;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tracing_test::traced_test;

use super::common::{
    Harness, MockChainService, batch_message, block_message, chain_from, detached_block,
    state_message,
};
use crate::sync::{InitialSync, SyncOutcome, SyncSettings, SyncState};
use crate::types::{
    BatchedBeaconBlockRequest, BeaconBlockResponse, OutboundP2pRequest, P2pMessage,
};

#[test]
fn test_subscribes_all_topics() {
    let harness = Harness::new();
    let _sync = harness.sync();

    assert_eq!(harness.transport.subscriptions().len(), 4);
}

#[test]
fn test_requires_chain_head() {
    let harness = Harness::with_store(Arc::new(db::InMemoryStore::new()), Default::default());

    assert!(InitialSync::new(harness.config(SyncSettings::default())).is_err());
}

#[test]
fn test_rejects_zero_buffer() {
    let harness = Harness::new();
    let settings = SyncSettings {
        state_buffer_size: 0,
        ..SyncSettings::default()
    };

    assert!(InitialSync::new(harness.config(settings)).is_err());
}

#[tokio::test]
#[traced_test]
async fn test_tick_after_catch_up_hands_off() {
    let harness = Harness::new();
    let mut sync = harness.sync();
    let mut progress = sync.subscribe_progress();
    let blocks = harness.transport.block_sender();
    let (tick_tx, tick_rx) = mpsc::channel(1);

    let (outcome, ()) = tokio::join!(sync.run(tick_rx), async {
        for block in chain_from(&harness.genesis, 1..=20) {
            blocks.send(block_message(block)).await.unwrap();
        }
        progress
            .wait_for(|progress| progress.current_slot == Slot(20))
            .await
            .unwrap();
        tick_tx.send(()).await.unwrap();
    });

    assert_eq!(outcome, SyncOutcome::CaughtUp);
    assert_eq!(sync.state(), SyncState::CaughtUp);
    assert_eq!(harness.steady_state.resume_count(), 1);
    assert!(logs_contain("Exiting initial sync and starting normal sync"));
    assert!(
        harness
            .transport
            .subscriptions()
            .iter()
            .all(|subscription| !subscription.is_active())
    );
}

#[tokio::test]
async fn test_batch_then_tick() {
    let harness = Harness::new();
    let mut sync = harness.sync();
    let mut progress = sync.subscribe_progress();
    let batches = harness.transport.batch_sender();
    let (tick_tx, tick_rx) = mpsc::channel(1);

    let (outcome, ()) = tokio::join!(sync.run(tick_rx), async {
        batches
            .send(batch_message(chain_from(&harness.genesis, 1..=20)))
            .await
            .unwrap();
        progress
            .wait_for(|progress| progress.current_slot == Slot(20))
            .await
            .unwrap();
        tick_tx.send(()).await.unwrap();
    });

    assert_eq!(outcome, SyncOutcome::CaughtUp);
    assert_eq!(sync.progress().highest_observed_slot(), Slot(20));
}

#[tokio::test]
async fn test_stalled_gap_requests_range() {
    let harness = Harness::new();
    let mut sync = harness.sync();
    let mut progress = sync.subscribe_progress();
    let token = sync.cancellation_token();
    let blocks = harness.transport.block_sender();
    let (tick_tx, tick_rx) = mpsc::channel(1);
    let peer = PeerId::random();

    let (outcome, ()) = tokio::join!(sync.run(tick_rx), async {
        let stray = P2pMessage::new(
            peer,
            BeaconBlockResponse {
                block: detached_block(6),
            },
        );
        blocks.send(stray).await.unwrap();
        progress
            .wait_for(|progress| progress.highest_observed_slot == Slot(6))
            .await
            .unwrap();

        tick_tx.send(()).await.unwrap();
        // The tick slot is free again only once the previous tick was taken.
        tick_tx.send(()).await.unwrap();
        token.cancel();
    });

    assert_eq!(outcome, SyncOutcome::Cancelled);
    assert_eq!(sync.progress().current_slot(), Slot(0));

    let request = OutboundP2pRequest::RequestBlocksByRange(BatchedBeaconBlockRequest {
        start_slot: Slot(1),
        end_slot: Slot(6),
    });
    assert_eq!(harness.transport.sent().first(), Some(&(request, peer)));
}

#[tokio::test]
async fn test_cancellation() {
    let harness = Harness::new();
    let mut sync = harness.sync();
    let token = sync.cancellation_token();
    let (_tick_tx, tick_rx) = mpsc::channel(1);

    token.cancel();

    assert_eq!(sync.run(tick_rx).await, SyncOutcome::Cancelled);
    assert_eq!(harness.steady_state.resume_count(), 0);
}

#[tokio::test]
async fn test_cancellation_while_behind() {
    let harness = Harness::new();
    let mut sync = harness.sync();
    let mut progress = sync.subscribe_progress();
    let token = sync.cancellation_token();
    let states = harness.transport.state_sender();
    let (_tick_tx, tick_rx) = mpsc::channel(1);

    let (outcome, ()) = tokio::join!(sync.run(tick_rx), async {
        states.send(state_message(3, 3)).await.unwrap();
        progress
            .wait_for(|progress| progress.target_finalized_epoch.is_some())
            .await
            .unwrap();
        token.cancel();
    });

    assert_eq!(outcome, SyncOutcome::Cancelled);
    assert_eq!(sync.state(), SyncState::Syncing);
    assert!(!sync.is_caught_up());
}

#[tokio::test]
async fn test_closed_inputs_end_run() {
    let harness = Harness::new();
    let mut sync = harness.sync();
    let (tick_tx, tick_rx) = mpsc::channel(1);

    harness.transport.close_inbound();
    drop(tick_tx);

    let outcome = tokio::time::timeout(Duration::from_secs(5), sync.run(tick_rx))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Cancelled);
}

#[tokio::test]
#[traced_test]
async fn test_handler_panic_is_contained() {
    let harness = Harness::new();
    let mut config = harness.config(SyncSettings::default());
    config.chain = Arc::new(MockChainService::panicking_at(
        harness.store.clone(),
        Slot(2),
    ));
    let mut sync = InitialSync::new(config).unwrap();
    let mut progress = sync.subscribe_progress();
    let token = sync.cancellation_token();
    let blocks = harness.transport.block_sender();
    let states = harness.transport.state_sender();
    let (_tick_tx, tick_rx) = mpsc::channel(1);

    let (outcome, ()) = tokio::join!(sync.run(tick_rx), async {
        blocks
            .send(P2pMessage::empty(PeerId::random()))
            .await
            .unwrap();
        for block in chain_from(&harness.genesis, 1..=2) {
            blocks.send(block_message(block)).await.unwrap();
        }
        progress
            .wait_for(|progress| progress.highest_observed_slot == Slot(2))
            .await
            .unwrap();

        // The loop is still alive after the panic.
        states.send(state_message(1, 1)).await.unwrap();
        progress
            .wait_for(|progress| progress.target_finalized_epoch.is_some())
            .await
            .unwrap();
        token.cancel();
    });

    assert_eq!(outcome, SyncOutcome::Cancelled);
    assert_eq!(sync.progress().current_slot(), Slot(1));
    assert!(logs_contain("Panicked when handling p2p message! Recovering..."));
    assert!(logs_contain("state transition failed at slot 2"));
    assert!(logs_contain("message contains no data"));
    assert!(
        harness
            .metrics
            .gather()
            .contains("initial_sync_handler_panics_total 1")
    );
}

#[tokio::test]
async fn test_start_ticks_until_caught_up() {
    let harness = Harness::new();
    let sync = harness.sync_with(SyncSettings {
        sync_interval_ms: 50,
        ..SyncSettings::default()
    });

    let outcome = sync.start().await;

    assert_eq!(outcome, SyncOutcome::CaughtUp);
    assert_eq!(harness.steady_state.resume_count(), 1);
}
