//! `fleetlog [CONFIG] [--artifact-dir DIR]`
//!
//! Loads the fleet configuration, collects logs from every instance over SSH
//! and prints the run summary as JSON. Ctrl-C cancels the run; whatever was
//! already collected stays recorded in the configuration file.

use anyhow::{Context, Result};
use clap::Parser;
use fleetlog_kernel::config::{config_path, load_config};
use fleetlog_kernel::session::SshConnector;
use fleetlog_kernel::state::new_fleet;
use fleetlog_kernel::LogFetcher;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

#[derive(Debug, Parser)]
#[command(author, version, about = "Collects diagnostic logs from every instance of a fleet")]
struct Args {
    /// Fleet configuration file; falls back to $FLEETLOG_CONFIG, then fleetlog.yaml
    config: Option<String>,
    /// Copy collected files and the configuration here after the run
    #[arg(long)]
    artifact_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let path = config_path(args.config);
    let cfg = load_config(&path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;

    let level = cfg.log_level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
    info!(name = %cfg.name, instances = cfg.status.expected_instances(), "fleetlog starting");

    let connector = Arc::new(SshConnector::new(cfg.remote_access.clone()));
    let cancel = CancellationToken::new();
    let fetcher = LogFetcher::new(new_fleet(cfg), connector, cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling log collection");
            cancel.cancel();
        }
    });

    match args.artifact_dir {
        Some(dir) => {
            let copied = fetcher
                .download_logs(&dir)
                .await
                .context("log download failed")?;
            info!(artifact_dir = %dir.display(), files = copied, "artifacts ready");
        }
        None => {
            let summary = fetcher.fetch_logs().await.context("log collection failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
