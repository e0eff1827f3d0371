mod recorder;
mod server;

use clap::Parser;
use pkg_constants::paths::{DEFAULT_MANIFEST, DEFAULT_SERVER_CONFIG, DEFAULT_SERVER_DATA_DIR};
use pkg_scheduler::SchedulerConfig;
use pkg_types::config::{Manifest, ServerConfigFile, load_config_file};
use server::{ServerConfig, run};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kq-server", about = "Quota-based workload admission server")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_SERVER_CONFIG)]
    config: String,

    /// Path to YAML manifest with flavors, ClusterQueues, queues and workloads
    #[arg(long, short)]
    manifest: Option<String>,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Seconds between scheduling cycles when nothing triggers one
    #[arg(long)]
    cycle_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: ServerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_SERVER_DATA_DIR.to_string());
    let manifest_path = cli
        .manifest
        .or(file_cfg.manifest)
        .unwrap_or_else(|| DEFAULT_MANIFEST.to_string());
    let mut scheduler = SchedulerConfig::from_file(&file_cfg.scheduler);
    if let Some(secs) = cli.cycle_interval_secs {
        scheduler.cycle_interval = Duration::from_secs(secs.max(1));
    }
    let manifest: Manifest = load_config_file(&manifest_path)?;

    info!("Starting kq-server");
    info!("  Data dir:  {}", data_dir);
    info!("  Manifest:  {}", manifest_path);
    info!("  Interval:  {}s", scheduler.cycle_interval.as_secs());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    run(
        ServerConfig {
            data_dir,
            manifest,
            scheduler,
        },
        cancel,
    )
    .await
}
