use std::ops::RangeInclusive;

use containers::Slot;

/// Local chain progress against what the network has shown us.
///
/// `current_slot` is the slot up to which the local chain is contiguous and
/// persisted; `highest_observed_slot` is the highest slot seen in any
/// delivery. `current_slot <= highest_observed_slot` always holds and neither
/// value ever decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainProgress {
    current_slot: Slot,
    highest_observed_slot: Slot,
}

impl ChainProgress {
    /// Progress anchored at the local chain head.
    pub fn new(head_slot: Slot) -> Self {
        Self {
            current_slot: head_slot,
            highest_observed_slot: head_slot,
        }
    }

    pub fn current_slot(&self) -> Slot {
        self.current_slot
    }

    pub fn highest_observed_slot(&self) -> Slot {
        self.highest_observed_slot
    }

    /// Move the contiguous head forward. Stale and duplicate advances are ignored.
    pub fn advance(&mut self, slot: Slot) {
        if slot <= self.current_slot {
            return;
        }
        self.current_slot = slot;
        if slot > self.highest_observed_slot {
            self.highest_observed_slot = slot;
        }
    }

    /// Record that `slot` exists on the network.
    ///
    /// Returns whether this raised the highest observed slot.
    pub fn observe(&mut self, slot: Slot) -> bool {
        if slot > self.highest_observed_slot {
            self.highest_observed_slot = slot;
            true
        } else {
            false
        }
    }

    pub fn is_caught_up(&self) -> bool {
        self.current_slot >= self.highest_observed_slot
    }

    /// Slots still missing locally, `None` once caught up.
    pub fn gap(&self) -> Option<RangeInclusive<Slot>> {
        if self.is_caught_up() {
            None
        } else {
            Some(self.current_slot.next()..=self.highest_observed_slot)
        }
    }
}
