use std::cmp::Ordering;

use crate::model::{ChannelSchedule, ScheduleEntry};

/// Newest listing day first; within a day, by air date then air time.
pub fn compare(a: &ScheduleEntry, b: &ScheduleEntry) -> Ordering {
    b.grouping_date
        .cmp(&a.grouping_date)
        .then_with(|| a.air_date.cmp(&b.air_date))
        .then_with(|| a.air_time.cmp(&b.air_time))
}

pub fn order(entries: &mut [ScheduleEntry]) {
    entries.sort_by(compare);
}

/// Order every channel's entries independently.
pub fn order_schedule(schedule: &mut ChannelSchedule) {
    for entries in schedule.values_mut() {
        order(entries);
    }
}
