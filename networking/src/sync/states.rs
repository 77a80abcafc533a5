/// Initial sync lifecycle.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No sync target confirmed yet.
    ///
    /// Initial state. When the engine is configured to request a state first,
    /// blocks are observed but not persisted until a target arrives.
    #[default]
    Requesting,

    /// A sync target has been confirmed and blocks are being filled in.
    Syncing,

    /// Local progress reached the highest observed slot.
    ///
    /// Terminal: the engine hands off to steady-state sync and stops.
    CaughtUp,
}

impl SyncState {
    /// Check if a transition to the target state is valid.
    pub fn can_transition_to(&self, target: SyncState) -> bool {
        match self {
            SyncState::Requesting => matches!(target, SyncState::Syncing | SyncState::CaughtUp),
            SyncState::Syncing => matches!(target, SyncState::CaughtUp),
            SyncState::CaughtUp => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::CaughtUp)
    }
}
