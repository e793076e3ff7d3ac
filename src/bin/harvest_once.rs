use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use archive_playlist::config;
use archive_playlist::cycle;
use archive_playlist::fetcher::HttpFetcher;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run a single harvest cycle against the configured playlist and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the merged playlist to stdout instead of writing it
    #[arg(long)]
    dry_run: bool,

    /// Print the ordered schedule as JSON and leave the playlist alone
    #[arg(long, conflicts_with = "dry_run")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let fetcher = Arc::new(HttpFetcher::from_config(&cfg.source)?);

    if args.json {
        let (locators, harvest) = cycle::build_schedule(&cfg, fetcher).await;
        println!("{}", serde_json::to_string_pretty(&harvest.schedule)?);
        info!(locators, entries = harvest.entry_count(), "schedule dumped");
    } else if args.dry_run {
        let (report, merged) = cycle::prepare(&cfg, fetcher).await?;
        let mut out = std::io::stdout().lock();
        for line in &merged {
            out.write_all(line)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        info!(?report, "dry run complete; playlist not written");
    } else {
        let report = cycle::run_cycle(&cfg, fetcher).await?;
        info!(?report, playlist = %cfg.playlist.path, "playlist updated");
    }
    Ok(())
}
