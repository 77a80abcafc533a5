use containers::{Bytes32, Epoch, State};
use tracing::{debug, info, warn};

use super::service::{InitialSync, gauge_value};
use super::states::SyncState;
use crate::message_handler::NO_DATA_MARKER;
use crate::types::{BeaconStateResponse, P2pMessage};

/// The state snapshot initial sync is racing to.
///
/// Replaced wholesale by a more advanced snapshot, never updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub finalized_epoch: Epoch,
    pub justified_epoch: Epoch,
    pub state_root: Bytes32,
    pub snapshot: State,
}

impl SyncTarget {
    pub fn from_state(snapshot: State) -> Self {
        Self {
            finalized_epoch: snapshot.finalized_epoch(),
            justified_epoch: snapshot.justified_epoch(),
            state_root: snapshot.root(),
            snapshot,
        }
    }

    /// Higher finality wins; on a finality tie, higher justification wins.
    pub fn is_superseded_by(&self, state: &State) -> bool {
        let finalized = state.finalized_epoch();
        finalized > self.finalized_epoch
            || (finalized == self.finalized_epoch && state.justified_epoch() > self.justified_epoch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    Accepted,
    /// Not more advanced than the current target.
    Rejected,
    /// The store could not persist the snapshot.
    Failed,
    Malformed,
}

impl InitialSync {
    pub fn process_state(&mut self, message: &P2pMessage<BeaconStateResponse>) -> StateOutcome {
        let Some(response) = &message.data else {
            warn!(peer = %message.peer, "Dropping state message: {NO_DATA_MARKER}");
            return self.record_state_outcome(StateOutcome::Malformed);
        };
        let state = &response.beacon_state;

        if let Some(target) = &self.target {
            if !target.is_superseded_by(state) {
                debug!(
                    peer = %message.peer,
                    finalized_epoch = %state.finalized_epoch(),
                    justified_epoch = %state.justified_epoch(),
                    target_finalized_epoch = %target.finalized_epoch,
                    target_justified_epoch = %target.justified_epoch,
                    "Ignoring state that does not advance the sync target"
                );
                return self.record_state_outcome(StateOutcome::Rejected);
            }
        }

        if let Err(error) = self.store.save_state(state) {
            warn!(peer = %message.peer, "Could not save sync target state: {error}");
            return self.record_state_outcome(StateOutcome::Failed);
        }

        let target = SyncTarget::from_state(state.clone());
        let target_slot = target.finalized_epoch.start_slot();

        info!(
            peer = %message.peer,
            finalized_epoch = %target.finalized_epoch,
            justified_epoch = %target.justified_epoch,
            state_root = %target.state_root,
            %target_slot,
            "Accepted new sync target"
        );

        if let Some(metrics) = &self.metrics {
            metrics.set_target_finalized_epoch(gauge_value(target.finalized_epoch.0));
        }

        self.target = Some(target);
        self.observe_from(target_slot, message.peer);
        self.transition(SyncState::Syncing);

        self.record_state_outcome(StateOutcome::Accepted)
    }

    fn record_state_outcome(&self, outcome: StateOutcome) -> StateOutcome {
        if let Some(metrics) = &self.metrics {
            let result = match outcome {
                StateOutcome::Accepted => "accepted",
                StateOutcome::Rejected => "rejected",
                StateOutcome::Failed => "failed",
                StateOutcome::Malformed => "malformed",
            };
            metrics.inc_states_received(result);
        }
        outcome
    }
}
