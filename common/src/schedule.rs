use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::OperatingMode;

const MINUTES_PER_DAY: u32 = 24 * 60;
const MINUTES_PER_WEEK: u32 = 7 * MINUTES_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    fn days_from_monday(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub day: DayOfWeek,
    #[serde(rename = "startMinutes")]
    pub start_minutes: u16,
    pub mode: OperatingMode,
}

impl ScheduleEntry {
    pub fn validate(&self) -> bool {
        u32::from(self.start_minutes) < MINUTES_PER_DAY
    }

    fn week_minute(&self) -> u32 {
        self.day.days_from_monday() * MINUTES_PER_DAY + u32::from(self.start_minutes)
    }
}

fn week_minute_of(now: &DateTime<FixedOffset>) -> u32 {
    now.weekday().num_days_from_monday() * MINUTES_PER_DAY + now.hour() * 60 + now.minute()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub enabled: bool,
    pub entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn normalize(&mut self) {
        self.entries.retain(ScheduleEntry::validate);
        self.entries.sort_by_key(ScheduleEntry::week_minute);
    }

    fn active_entries(&self) -> Option<&[ScheduleEntry]> {
        (self.enabled && !self.entries.is_empty()).then_some(self.entries.as_slice())
    }

    // Before the first transition of the week, last week's final entry still holds.
    pub fn current_mode(&self, now: DateTime<FixedOffset>) -> Option<OperatingMode> {
        let entries = self.active_entries()?;
        let now = week_minute_of(&now);

        entries
            .iter()
            .filter(|entry| entry.week_minute() <= now)
            .max_by_key(|entry| entry.week_minute())
            .or_else(|| entries.iter().max_by_key(|entry| entry.week_minute()))
            .map(|entry| entry.mode)
    }

    pub fn next_event_epoch(&self, now: DateTime<FixedOffset>) -> Option<i64> {
        let entries = self.active_entries()?;
        let now_minute = week_minute_of(&now);

        // Minutes until each entry fires again, in 1..=MINUTES_PER_WEEK.
        let wait = entries
            .iter()
            .map(|entry| {
                (entry.week_minute() + MINUTES_PER_WEEK - now_minute - 1) % MINUTES_PER_WEEK + 1
            })
            .min()?;

        Some(now.timestamp() - i64::from(now.second()) + i64::from(wait) * 60)
    }
}
