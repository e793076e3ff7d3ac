use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One program airing, as harvested from a channel-day page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub channel: String,
    pub channel_name: String,
    /// Calendar date of `air_time`.
    pub air_date: NaiveDate,
    pub air_time: DateTime<FixedOffset>,
    /// Start time as printed by the site, e.g. "06:30".
    pub start_label: String,
    pub title: String,
    pub detail_href: String,
    pub program_id: String,
    pub day_label: String,
    pub weekday_label: String,
    /// The day whose listing page produced this entry. Late-night programs
    /// belong to the previous day's page, so this can differ from `air_date`.
    pub grouping_date: NaiveDate,
}

/// One channel-day listing page waiting to be fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayLocator {
    pub channel: String,
    pub channel_name: String,
    pub url: String,
    pub day_label: String,
    pub weekday_label: String,
    pub grouping_date: NaiveDate,
}

/// Entries keyed by channel identifier. Rebuilt from scratch every cycle.
pub type ChannelSchedule = BTreeMap<String, Vec<ScheduleEntry>>;

/// Fields a day page yields for one program before the locator's channel
/// and day attributes are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramRecord {
    pub air_time: DateTime<FixedOffset>,
    pub start_label: String,
    pub title: String,
    pub detail_href: String,
    pub program_id: String,
}

impl DayLocator {
    pub fn entry(&self, record: ProgramRecord) -> ScheduleEntry {
        ScheduleEntry {
            channel: self.channel.clone(),
            channel_name: self.channel_name.clone(),
            air_date: record.air_time.date_naive(),
            air_time: record.air_time,
            start_label: record.start_label,
            title: record.title,
            detail_href: record.detail_href,
            program_id: record.program_id,
            day_label: self.day_label.clone(),
            weekday_label: self.weekday_label.clone(),
            grouping_date: self.grouping_date,
        }
    }
}
