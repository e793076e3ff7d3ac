use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Mutex;
use tracing::{error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::config::{self, Config};
use crate::fetcher::Fetcher;
use crate::harvest::{harvest, Harvest};
use crate::model::DayLocator;
use crate::ordering::order_schedule;
use crate::playlist::{merge, read_document, write_document, RawLine};

/// Configuration shared by the reload loop and the cycle loop. Each holds the
/// lock for the whole of its run, so a cycle never sees a half-applied reload.
pub type SharedConfig = Arc<Mutex<Config>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub locators: usize,
    pub fetched_days: usize,
    pub failed_days: usize,
    pub entries: usize,
    pub lines: usize,
}

/// Ask the fetcher for every configured channel's day pages. A channel whose
/// listing fails is skipped for this cycle.
pub async fn collect_locators(fetcher: &dyn Fetcher, channels: &[String]) -> Vec<DayLocator> {
    let mut locators = Vec::new();
    for channel in channels {
        match fetcher.list_days(channel).await {
            Ok(days) => locators.extend(days),
            Err(err) => warn!(%channel, ?err, "failed to list channel days; skipping channel"),
        }
    }
    locators
}

/// Harvest and order this cycle's schedule.
pub async fn build_schedule(cfg: &Config, fetcher: Arc<dyn Fetcher>) -> (usize, Harvest) {
    let locators = collect_locators(fetcher.as_ref(), &cfg.channels).await;
    let count = locators.len();
    let mut harvest = harvest(locators, cfg.app.workers, fetcher).await;
    order_schedule(&mut harvest.schedule);
    (count, harvest)
}

/// Harvest, then merge into the current playlist without writing it.
pub async fn prepare(cfg: &Config, fetcher: Arc<dyn Fetcher>) -> Result<(CycleReport, Vec<RawLine>)> {
    let (locators, harvest) = build_schedule(cfg, fetcher).await;
    let existing = read_document(Path::new(&cfg.playlist.path)).await?;
    let merged = merge(&existing, &cfg.channels, &harvest.schedule);
    let report = CycleReport {
        locators,
        fetched_days: harvest.fetched_days,
        failed_days: harvest.failed_days,
        entries: harvest.entry_count(),
        lines: merged.len(),
    };
    Ok((report, merged))
}

/// One full fetch, order, merge and persist pass.
#[instrument(skip_all, fields(playlist = %cfg.playlist.path))]
pub async fn run_cycle(cfg: &Config, fetcher: Arc<dyn Fetcher>) -> Result<CycleReport> {
    let (report, merged) = prepare(cfg, fetcher).await?;
    write_document(Path::new(&cfg.playlist.path), &merged).await?;
    Ok(report)
}

/// Run cycles forever, sleeping the configured interval between them.
/// `make_fetcher` is called per cycle so reloaded source settings apply.
pub async fn cycle_loop<F>(config: SharedConfig, make_fetcher: F)
where
    F: Fn(&Config) -> Result<Arc<dyn Fetcher>> + Send + Sync,
{
    loop {
        let interval = {
            let cfg = config.lock().await;
            let span = info_span!("cycle", id = %Uuid::new_v4());
            async {
                info!(channels = cfg.channels.len(), "updating playlist");
                match make_fetcher(&cfg) {
                    Ok(fetcher) => match run_cycle(&cfg, fetcher).await {
                        Ok(report) => info!(?report, "playlist updated"),
                        Err(err) => error!(?err, "playlist update failed; retrying next cycle"),
                    },
                    Err(err) => error!(?err, "failed to build fetcher; retrying next cycle"),
                }
            }
            .instrument(span)
            .await;
            cfg.app.cycle_interval()
        };
        tokio::time::sleep(interval).await;
    }
}

/// Re-read the configuration file under the lock. On failure the previous
/// configuration stays in effect.
pub async fn reload(config: &SharedConfig, path: &Path) -> bool {
    let mut cfg = config.lock().await;
    match config::load(Some(path)) {
        Ok(fresh) => {
            if *cfg != fresh {
                info!(channels = fresh.channels.len(), "configuration changed");
            }
            *cfg = fresh;
            info!("configuration reloaded");
            true
        }
        Err(err) => {
            warn!(?err, path = %path.display(), "configuration reload failed; keeping previous");
            false
        }
    }
}

/// Periodically reload the configuration file.
pub async fn reload_loop(config: SharedConfig, path: PathBuf) {
    loop {
        let interval = config.lock().await.app.reload_interval();
        tokio::time::sleep(interval).await;
        reload(&config, &path).await;
    }
}

/// Resolve once a line is read from `input`. A closed or failing input never
/// resolves, so a daemon started without a terminal keeps running.
pub async fn wait_for_enter<R>(input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    match lines.next_line().await {
        Ok(Some(_)) => {}
        Ok(None) => {
            info!("stdin closed; waiting for Ctrl-C");
            std::future::pending::<()>().await;
        }
        Err(err) => {
            warn!(?err, "stdin unreadable; waiting for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
