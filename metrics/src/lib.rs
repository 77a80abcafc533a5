pub mod server;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    // Progress
    current_slot: IntGauge,
    highest_observed_slot: IntGauge,
    target_finalized_epoch: IntGauge,
    // Ingestion
    blocks_saved: IntCounter,
    blocks_rejected: IntCounterVec,
    states_received: IntCounterVec,
    block_processing_time: HistogramVec,
    handler_panics: IntCounter,
    // Requests
    requests_sent: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let current_slot = IntGauge::with_opts(Opts::new("initial_sync_current_slot", "Slot up to which the local chain is contiguous")).unwrap();
        registry.register(Box::new(current_slot.clone())).unwrap();

        let highest_observed_slot = IntGauge::with_opts(Opts::new("initial_sync_highest_observed_slot", "Highest slot observed from the network")).unwrap();
        registry.register(Box::new(highest_observed_slot.clone())).unwrap();

        let target_finalized_epoch = IntGauge::with_opts(Opts::new("initial_sync_target_finalized_epoch", "Finalized epoch of the accepted sync target")).unwrap();
        registry.register(Box::new(target_finalized_epoch.clone())).unwrap();

        let blocks_saved = IntCounter::with_opts(Opts::new("initial_sync_blocks_saved_total", "Total number of blocks persisted by initial sync")).unwrap();
        registry.register(Box::new(blocks_saved.clone())).unwrap();

        let blocks_rejected = IntCounterVec::new(
            Opts::new("initial_sync_blocks_rejected_total", "Total number of block deliveries not persisted"),
            &["reason"],
        ).unwrap();
        registry.register(Box::new(blocks_rejected.clone())).unwrap();

        let states_received = IntCounterVec::new(
            Opts::new("initial_sync_states_received_total", "Total number of state snapshots received"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(states_received.clone())).unwrap();

        let block_processing_time = HistogramVec::new(
            HistogramOpts::new("initial_sync_block_processing_time_seconds", "Time taken to persist and import a block")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 1.0]),
            &[],
        ).unwrap();
        registry.register(Box::new(block_processing_time.clone())).unwrap();

        let handler_panics = IntCounter::with_opts(Opts::new("initial_sync_handler_panics_total", "Total number of recovered message handler panics")).unwrap();
        registry.register(Box::new(handler_panics.clone())).unwrap();

        let requests_sent = IntCounterVec::new(
            Opts::new("initial_sync_requests_sent_total", "Total number of sync requests emitted"),
            &["kind"],
        ).unwrap();
        registry.register(Box::new(requests_sent.clone())).unwrap();

        Self {
            registry,
            current_slot,
            highest_observed_slot,
            target_finalized_epoch,
            blocks_saved,
            blocks_rejected,
            states_received,
            block_processing_time,
            handler_panics,
            requests_sent,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    // Progress
    pub fn set_current_slot(&self, v: i64) {
        self.current_slot.set(v);
    }

    pub fn set_highest_observed_slot(&self, v: i64) {
        self.highest_observed_slot.set(v);
    }

    pub fn set_target_finalized_epoch(&self, v: i64) {
        self.target_finalized_epoch.set(v);
    }

    // Ingestion
    pub fn inc_blocks_saved(&self) {
        self.blocks_saved.inc();
    }

    pub fn inc_blocks_rejected(&self, reason: &str) {
        self.blocks_rejected.with_label_values(&[reason]).inc();
    }

    pub fn inc_states_received(&self, result: &str) {
        self.states_received.with_label_values(&[result]).inc();
    }

    pub fn observe_block_processing_time(&self, duration: f64) {
        self.block_processing_time.with_label_values::<&str>(&[]).observe(duration);
    }

    pub fn inc_handler_panics(&self) {
        self.handler_panics.inc();
    }

    // Requests
    pub fn inc_requests_sent(&self, kind: &str) {
        self.requests_sent.with_label_values(&[kind]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;
