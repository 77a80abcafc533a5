pub const GENESIS_SLOT: u64 = 0;
pub const SLOTS_PER_EPOCH: u64 = 64;
pub const SECONDS_PER_SLOT: u64 = 6;
pub const SLOT_DURATION_MS: u64 = SECONDS_PER_SLOT * 1_000;

#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub genesis_slot: u64,
    pub slots_per_epoch: u64,
    pub seconds_per_slot: u64,
    pub slot_duration_ms: u64,
}

impl ChainConfig {
    #[inline]
    pub fn epoch_start_slot(&self, epoch: u64) -> u64 {
        epoch.saturating_mul(self.slots_per_epoch)
    }
}

pub const DEVNET_CONFIG: ChainConfig = ChainConfig {
    genesis_slot: GENESIS_SLOT,
    slots_per_epoch: SLOTS_PER_EPOCH,
    seconds_per_slot: SECONDS_PER_SLOT,
    slot_duration_ms: SLOT_DURATION_MS,
};
