//! Concurrent harvesting of channel-day pages.
//!
//! Three channels connect the pieces: a shared work queue of [`DayLocator`]s,
//! a bounded result queue of [`ScheduleEntry`]s, and a finish queue on which
//! each worker reports exactly once after the work queue is exhausted. A
//! single collector task owns the [`ChannelSchedule`] and hands it back over
//! a oneshot once it has counted every finish signal and drained the results.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::fetcher::Fetcher;
use crate::model::{ChannelSchedule, DayLocator, ScheduleEntry};

/// Capacity of the result queue. Workers wait when the collector lags.
pub const RESULT_QUEUE_CAPACITY: usize = 200;

/// What one worker reports when it runs out of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub fetched_days: usize,
    pub failed_days: usize,
    pub entries: usize,
}

/// Outcome of one harvest.
#[derive(Debug, Default)]
pub struct Harvest {
    pub schedule: ChannelSchedule,
    pub fetched_days: usize,
    pub failed_days: usize,
}

impl Harvest {
    pub fn entry_count(&self) -> usize {
        self.schedule.values().map(Vec::len).sum()
    }
}

type WorkQueue = Arc<Mutex<mpsc::Receiver<DayLocator>>>;

/// Fetch every locator with `workers` concurrent workers and collect the
/// entries by channel. A failed locator is logged and contributes nothing.
#[instrument(skip_all, fields(locators = locators.len(), workers = workers))]
pub async fn harvest(
    locators: Vec<DayLocator>,
    workers: usize,
    fetcher: Arc<dyn Fetcher>,
) -> Harvest {
    let workers = workers.max(1);

    let (work_tx, work_rx) = mpsc::channel::<DayLocator>(workers);
    let (entry_tx, entry_rx) = mpsc::channel::<ScheduleEntry>(RESULT_QUEUE_CAPACITY);
    let (finish_tx, finish_rx) = mpsc::channel::<WorkerSummary>(workers);
    let (done_tx, done_rx) = oneshot::channel::<Harvest>();

    tokio::spawn(collect(entry_rx, finish_rx, workers, done_tx));

    let work_rx: WorkQueue = Arc::new(Mutex::new(work_rx));
    for id in 0..workers {
        tokio::spawn(work(
            id,
            Arc::clone(&work_rx),
            entry_tx.clone(),
            finish_tx.clone(),
            Arc::clone(&fetcher),
        ));
    }
    // Only workers may hold producer handles, otherwise the collector's final
    // drain would never see the result queue close.
    drop(entry_tx);
    drop(finish_tx);

    for locator in locators {
        if work_tx.send(locator).await.is_err() {
            warn!("all workers exited early; remaining locators dropped");
            break;
        }
    }
    drop(work_tx);

    match done_rx.await {
        Ok(harvest) => harvest,
        Err(_) => {
            warn!("collector exited without reporting; harvest is empty");
            Harvest::default()
        }
    }
}

async fn next_locator(queue: &WorkQueue) -> Option<DayLocator> {
    queue.lock().await.recv().await
}

async fn work(
    id: usize,
    queue: WorkQueue,
    entries: mpsc::Sender<ScheduleEntry>,
    finish: mpsc::Sender<WorkerSummary>,
    fetcher: Arc<dyn Fetcher>,
) {
    let mut summary = WorkerSummary::default();
    while let Some(locator) = next_locator(&queue).await {
        let fetched = match fetcher.fetch_day(&locator).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(
                    worker = id,
                    channel = %locator.channel,
                    url = %locator.url,
                    ?err,
                    "failed to fetch day schedule; skipping"
                );
                summary.failed_days += 1;
                continue;
            }
        };
        summary.fetched_days += 1;
        for entry in fetched {
            if entry.channel.is_empty() {
                warn!(worker = id, url = %locator.url, "entry without channel; dropped");
                continue;
            }
            if entries.send(entry).await.is_err() {
                warn!(worker = id, "collector gone; stopping worker");
                return;
            }
            summary.entries += 1;
        }
    }
    debug!(worker = id, ?summary, "worker finished");
    let _ = finish.send(summary).await;
}

async fn collect(
    mut entries: mpsc::Receiver<ScheduleEntry>,
    mut finish: mpsc::Receiver<WorkerSummary>,
    workers: usize,
    done: oneshot::Sender<Harvest>,
) {
    let mut harvest = Harvest::default();
    let mut remaining = workers;

    while remaining > 0 {
        tokio::select! {
            biased;
            Some(entry) = entries.recv() => push(&mut harvest.schedule, entry),
            signal = finish.recv() => match signal {
                Some(summary) => {
                    harvest.fetched_days += summary.fetched_days;
                    harvest.failed_days += summary.failed_days;
                    remaining -= 1;
                }
                None => {
                    warn!(missing = remaining, "workers ended without a finish signal");
                    break;
                }
            },
        }
    }

    // A finish signal can overtake the worker's last entries, which sit on a
    // different queue. Workers drop their senders on exit, so this ends.
    while let Some(entry) = entries.recv().await {
        push(&mut harvest.schedule, entry);
    }

    info!(
        channels = harvest.schedule.len(),
        entries = harvest.entry_count(),
        fetched_days = harvest.fetched_days,
        failed_days = harvest.failed_days,
        "harvest collected"
    );
    let _ = done.send(harvest);
}

fn push(schedule: &mut ChannelSchedule, entry: ScheduleEntry) {
    schedule.entry(entry.channel.clone()).or_default().push(entry);
}
