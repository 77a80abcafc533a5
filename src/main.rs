use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chain::config::DEVNET_CONFIG;
use clap::Parser;
use containers::{Block, State};
use db::{BeaconStore, InMemoryStore};
use metrics::Metrics;
use metrics::server::{MetricsServerConfig, run_metrics_server};
use networking::sync::{
    ChainService, InitialSync, InitialSyncConfig, SteadyStateSync, SyncOutcome, SyncSettings,
};
use networking::types::OutboundP2pRequest;
use tokio::{sync::mpsc, task};
use tracing::{info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// YAML file with sync settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    genesis_time: u64,

    /// Wait for a finalized state before accepting blocks.
    #[arg(long)]
    request_state: bool,

    #[arg(long)]
    sync_interval_ms: Option<u64>,

    #[arg(long)]
    metrics: bool,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    #[arg(long, default_value_t = 8080)]
    metrics_port: u16,
}

/// Imports blocks by advancing the stored state and moving the head.
struct LocalChainService {
    store: Arc<dyn BeaconStore>,
}

impl ChainService for LocalChainService {
    fn receive_block(&self, block: &Block) -> Result<State> {
        let pre_state = self
            .store
            .state()?
            .context("no state to apply the block to")?;
        Ok(pre_state.advanced_with(block))
    }

    fn apply_fork_choice_rule(&self, block: &Block, state: &State) -> Result<()> {
        self.store.update_chain_head(block, state)?;
        Ok(())
    }
}

struct RegularSync;

impl SteadyStateSync for RegularSync {
    fn resume_sync(&self) {
        info!("Regular sync resumed");
    }
}

fn load_settings(args: &Args) -> Result<SyncSettings> {
    let mut settings = match &args.config {
        Some(path) => SyncSettings::load_from_file(path)?,
        None => SyncSettings::default(),
    };

    if args.request_state {
        settings.request_state = true;
    }
    if let Some(interval) = args.sync_interval_ms {
        settings.sync_interval_ms = interval;
    }

    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let settings = load_settings(&args)?;

    let store = Arc::new(InMemoryStore::new());
    let genesis = store
        .initialize(args.genesis_time)
        .context("failed to initialize store from genesis")?;
    info!(
        genesis_root = %genesis.root(),
        slots_per_epoch = DEVNET_CONFIG.slots_per_epoch,
        seconds_per_slot = DEVNET_CONFIG.seconds_per_slot,
        "Store initialized"
    );

    let (outbound_p2p_sender, mut outbound_p2p_receiver) =
        mpsc::unbounded_channel::<OutboundP2pRequest>();

    let outbound_handle = task::spawn(async move {
        while let Some(request) = outbound_p2p_receiver.recv().await {
            info!(%request, "Outbound sync request");
        }
    });

    let metrics = args.metrics.then(|| Arc::new(Metrics::new()));

    let sync = InitialSync::new(InitialSyncConfig {
        transport: Arc::new(outbound_p2p_sender),
        store: store.clone(),
        chain: Arc::new(LocalChainService {
            store: store.clone(),
        }),
        steady_state: Arc::new(RegularSync),
        settings,
        metrics: metrics.clone(),
    })?;

    let token = sync.cancellation_token();

    let metrics_handle = metrics.map(|metrics| {
        let config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port: args.metrics_port,
        };
        let shutdown = token.clone().cancelled_owned();
        task::spawn(async move {
            if let Err(err) = run_metrics_server(config, metrics, shutdown).await {
                warn!("Metrics server exited with error: {err:#}");
            }
        })
    });

    let ctrl_c_token = token.clone();
    task::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, stopping initial sync");
            ctrl_c_token.cancel();
        }
    });

    let outcome = sync.start().await;
    token.cancel();

    match outcome {
        SyncOutcome::CaughtUp => info!(head_slot = %store.chain_head()?.slot, "Initial sync complete"),
        SyncOutcome::Cancelled => info!("Initial sync cancelled"),
    }

    if let Some(handle) = metrics_handle {
        handle.await.context("metrics server task failed")?;
    }
    outbound_handle.abort();

    info!("Main async task exiting...");
    Ok(())
}
