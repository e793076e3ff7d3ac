use anyhow::Result;
use archive_playlist::config;
use archive_playlist::cycle::{self, SharedConfig};
use archive_playlist::fetcher::{Fetcher, HttpFetcher};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file (created with defaults if missing)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load_or_init(&args.config)?;
    info!(
        channels = cfg.channels.len(),
        workers = cfg.app.workers,
        playlist = %cfg.playlist.path,
        "configuration loaded"
    );
    let shared: SharedConfig = Arc::new(Mutex::new(cfg));

    tokio::spawn(cycle::reload_loop(shared.clone(), args.config.clone()));
    tokio::spawn(cycle::cycle_loop(shared, |cfg: &config::Config| {
        let fetcher = HttpFetcher::from_config(&cfg.source)?;
        Ok(Arc::new(fetcher) as Arc<dyn Fetcher>)
    }));

    println!("Press Enter to exit");
    tokio::select! {
        _ = cycle::wait_for_enter(BufReader::new(tokio::io::stdin())) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    info!("shutting down");
    Ok(())
}
