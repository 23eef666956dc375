//! The reference calendar that decides which day an activity belongs to.
//!
//! Every learner is evaluated against the same calendar so that the
//! on-demand and scheduled triggers agree on day boundaries.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// A fixed-offset calendar. Defaults to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CalendarSettings", into = "CalendarSettings")]
pub struct ReferenceCalendar {
    offset: FixedOffset,
}

/// Serialized form of [`ReferenceCalendar`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalendarSettings {
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl ReferenceCalendar {
    /// Creates a calendar `utc_offset_minutes` east of UTC.
    pub fn new(utc_offset_minutes: i32) -> Result<Self, ValidationError> {
        utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or(ValidationError::OffsetOutOfRange {
                minutes: utc_offset_minutes,
            })
    }

    /// Offset from UTC in minutes.
    pub fn utc_offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    /// The calendar date an instant falls on.
    pub fn date_of(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.offset).date_naive()
    }

    /// The current date in this calendar.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.date_of(now)
    }

    /// Half-open UTC range covering `date`: `[00:00:00, next day 00:00:00)`.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let shift = TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        let local_midnight = date.and_time(NaiveTime::MIN);
        let start = Utc.from_utc_datetime(&(local_midnight - shift));
        (start, start + TimeDelta::days(1))
    }
}

impl Default for ReferenceCalendar {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl TryFrom<CalendarSettings> for ReferenceCalendar {
    type Error = ValidationError;

    fn try_from(settings: CalendarSettings) -> Result<Self, Self::Error> {
        Self::new(settings.utc_offset_minutes)
    }
}

impl From<ReferenceCalendar> for CalendarSettings {
    fn from(calendar: ReferenceCalendar) -> Self {
        Self {
            utc_offset_minutes: calendar.utc_offset_minutes(),
        }
    }
}
