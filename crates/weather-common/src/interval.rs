//! Aggregation intervals, compute requests and store filters.

use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WeatherError, WeatherResult};
use crate::observation::WeatherRecord;

/// Window over which an aggregate is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interval {
    /// A single calendar day, addressed by 1-based day of year.
    Day { year: i32, day_of_year: u32 },
    Month { year: i32, month: u32 },
    Year { year: i32 },
}

impl Interval {
    pub fn year(&self) -> i32 {
        match *self {
            Interval::Day { year, .. } | Interval::Month { year, .. } | Interval::Year { year } => {
                year
            }
        }
    }

    /// Resolve a day-of-year interval to its calendar date.
    pub fn date(&self) -> WeatherResult<Option<NaiveDate>> {
        match *self {
            Interval::Day { year, day_of_year } => NaiveDate::from_yo_opt(year, day_of_year)
                .map(Some)
                .ok_or_else(|| {
                    WeatherError::InvalidRequest(format!(
                        "day {} does not exist in {}",
                        day_of_year, year
                    ))
                }),
            _ => Ok(None),
        }
    }

    /// Translate the interval into key-field bounds for one station.
    pub fn filter(&self, station_id: &str) -> WeatherResult<RecordFilter> {
        if station_id.is_empty() {
            return Err(WeatherError::InvalidRequest("empty station id".to_string()));
        }

        let (months, days) = match *self {
            Interval::Day { .. } => {
                // date() only returns None for non-day intervals
                let date = self.date()?.ok_or_else(|| {
                    WeatherError::InternalError("day interval without date".to_string())
                })?;
                (date.month()..=date.month(), date.day()..=date.day())
            }
            Interval::Month { year, month } => {
                if !(1..=12).contains(&month) {
                    return Err(WeatherError::InvalidRequest(format!(
                        "month {} out of range in {}",
                        month, year
                    )));
                }
                (month..=month, 1..=31)
            }
            Interval::Year { .. } => (1..=12, 1..=31),
        };

        Ok(RecordFilter {
            station_id: station_id.to_string(),
            year: self.year(),
            months,
            days,
        })
    }
}

/// Anything carried through a worker mailbox with a correlation id.
pub trait Correlated {
    fn request_id(&self) -> Uuid;
}

/// Unit of work for the aggregation workers, from a caller or a timer tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRequest {
    pub request_id: Uuid,
    pub station_id: String,
    pub interval: Interval,
}

impl ComputeRequest {
    pub fn new(station_id: impl Into<String>, interval: Interval) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            station_id: station_id.into(),
            interval,
        }
    }

    pub fn daily(station_id: impl Into<String>, year: i32, day_of_year: u32) -> Self {
        Self::new(station_id, Interval::Day { year, day_of_year })
    }

    pub fn monthly(station_id: impl Into<String>, year: i32, month: u32) -> Self {
        Self::new(station_id, Interval::Month { year, month })
    }

    pub fn yearly(station_id: impl Into<String>, year: i32) -> Self {
        Self::new(station_id, Interval::Year { year })
    }
}

impl Correlated for ComputeRequest {
    fn request_id(&self) -> Uuid {
        self.request_id
    }
}

/// Station metadata lookup request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRequest {
    pub request_id: Uuid,
    pub station_id: String,
}

impl StationRequest {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            station_id: station_id.into(),
        }
    }
}

impl Correlated for StationRequest {
    fn request_id(&self) -> Uuid {
        self.request_id
    }
}

/// Equality and range criteria over the record key fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub station_id: String,
    pub year: i32,
    pub months: RangeInclusive<u32>,
    pub days: RangeInclusive<u32>,
}

impl RecordFilter {
    pub fn matches(&self, record: &WeatherRecord) -> bool {
        record.station_id == self.station_id
            && record.year == self.year
            && self.months.contains(&record.month)
            && self.days.contains(&record.day)
    }
}

/// Number of days of `year` that have fully elapsed as of `today`.
pub fn elapsed_days(year: i32, today: NaiveDate) -> u32 {
    if year < today.year() {
        days_in_year(year)
    } else if year == today.year() {
        today.ordinal() - 1
    } else {
        0
    }
}

fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}
