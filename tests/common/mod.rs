use anyhow::{anyhow, Result};
use archive_playlist::fetcher::Fetcher;
use archive_playlist::model::{DayLocator, ScheduleEntry};
use chrono::{DateTime, Duration, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn locator(channel: &str, day: u32) -> DayLocator {
    DayLocator {
        channel: channel.to_string(),
        channel_name: format!("{channel} TV"),
        url: format!("/tv/program/{channel}/2016-03-{day:02}/"),
        day_label: day.to_string(),
        weekday_label: "пн".to_string(),
        grouping_date: NaiveDate::from_ymd_opt(2016, 3, day).unwrap(),
    }
}

/// `count` programs for the locator's day, starting at 06:00 every two hours.
pub fn entries_for(locator: &DayLocator, count: usize) -> Vec<ScheduleEntry> {
    let base = DateTime::parse_from_rfc3339(&format!(
        "{}T06:00:00+07:00",
        locator.grouping_date.format("%Y-%m-%d")
    ))
    .unwrap();
    (0..count)
        .map(|i| {
            let air_time = base + Duration::hours(2 * i as i64);
            ScheduleEntry {
                channel: locator.channel.clone(),
                channel_name: locator.channel_name.clone(),
                air_date: air_time.date_naive(),
                air_time,
                start_label: air_time.format("%H:%M").to_string(),
                title: format!("{} #{i}", locator.url),
                detail_href: String::new(),
                program_id: format!("{}-{}-{i}", locator.channel, locator.day_label),
                day_label: locator.day_label.clone(),
                weekday_label: locator.weekday_label.clone(),
                grouping_date: locator.grouping_date,
            }
        })
        .collect()
}

/// Fake fetcher: serves generated entries, fails configured URLs and records
/// every fetch it was asked for.
#[derive(Clone, Default)]
pub struct RecordingFetcher {
    pub days: HashMap<String, Vec<DayLocator>>,
    pub per_day: usize,
    pub failing: HashSet<String>,
    pub delay: Option<std::time::Duration>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingFetcher {
    pub fn new(per_day: usize) -> Self {
        Self {
            per_day,
            ..Default::default()
        }
    }

    pub fn with_days(mut self, channel: &str, days: &[u32]) -> Self {
        self.days.insert(
            channel.to_string(),
            days.iter().map(|d| locator(channel, *d)).collect(),
        );
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for RecordingFetcher {
    async fn list_days(&self, channel: &str) -> Result<Vec<DayLocator>> {
        self.days
            .get(channel)
            .cloned()
            .ok_or_else(|| anyhow!("unknown channel {channel}"))
    }

    async fn fetch_day(&self, locator: &DayLocator) -> Result<Vec<ScheduleEntry>> {
        self.calls.lock().await.push(locator.url.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&locator.url) {
            return Err(anyhow!("simulated failure for {}", locator.url));
        }
        Ok(entries_for(locator, self.per_day))
    }
}
