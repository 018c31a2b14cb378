//! Computed aggregate results and the single-pass folds that produce them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::observation::WeatherRecord;
use crate::station::WeatherStation;

/// Outcome of an aggregate query.
///
/// `NoData` means the interval has no ingested rows yet; callers should
/// retry later rather than treat it as a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Aggregate<T> {
    Computed(T),
    NoData,
}

impl<T> Aggregate<T> {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Aggregate::NoData)
    }

    pub fn computed(self) -> Option<T> {
        match self {
            Aggregate::Computed(value) => Some(value),
            Aggregate::NoData => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Aggregate<U> {
        match self {
            Aggregate::Computed(value) => Aggregate::Computed(f(value)),
            Aggregate::NoData => Aggregate::NoData,
        }
    }
}

impl<T> From<Option<T>> for Aggregate<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Aggregate::NoData, Aggregate::Computed)
    }
}

/// Outcome of a station metadata lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "station", rename_all = "snake_case")]
pub enum StationLookup {
    Found(WeatherStation),
    NotFound,
}

impl From<Option<WeatherStation>> for StationLookup {
    fn from(value: Option<WeatherStation>) -> Self {
        value.map_or(StationLookup::NotFound, StationLookup::Found)
    }
}

/// High, low and mean temperature of one station over an interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub station_id: String,
    pub interval: Interval,
    pub high: f64,
    pub low: f64,
    pub mean: f64,
    /// Number of hourly readings folded
    pub readings: usize,
}

/// Running min/max/average over a temperature sequence.
#[derive(Debug, Clone, Default)]
pub struct TemperatureFold {
    low: Option<f64>,
    high: Option<f64>,
    sum: f64,
    count: usize,
}

impl TemperatureFold {
    pub fn push(&mut self, temperature: f64) {
        self.low = Some(self.low.map_or(temperature, |low| low.min(temperature)));
        self.high = Some(self.high.map_or(temperature, |high| high.max(temperature)));
        self.sum += temperature;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `None` when nothing was folded.
    pub fn finish(self, station_id: &str, interval: Interval) -> Option<Temperature> {
        let (low, high) = (self.low?, self.high?);
        Some(Temperature {
            station_id: station_id.to_string(),
            interval,
            high,
            low,
            mean: self.sum / self.count as f64,
            readings: self.count,
        })
    }
}

/// Precipitation total for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrecipitation {
    pub date: NaiveDate,
    pub total: f64,
}

/// Cumulative precipitation of one station over one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precipitation {
    pub station_id: String,
    pub year: i32,
    /// Plain sum of every ingested one-hour value
    pub total: f64,
    pub readings: usize,
    /// Per-day totals in date order
    pub daily: Vec<DailyPrecipitation>,
}

impl Precipitation {
    /// The `k` wettest days, largest first; ties go to the earlier date.
    pub fn top_k(&self, k: usize) -> TopKPrecipitation {
        let mut days = self.daily.clone();
        days.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.date.cmp(&b.date)));
        days.truncate(k);

        TopKPrecipitation {
            station_id: self.station_id.clone(),
            year: self.year,
            days,
        }
    }
}

/// Wettest days of a station's year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKPrecipitation {
    pub station_id: String,
    pub year: i32,
    pub days: Vec<DailyPrecipitation>,
}

/// Running sum of one-hour precipitation, also bucketed per day.
#[derive(Debug, Clone, Default)]
pub struct PrecipitationFold {
    total: f64,
    readings: usize,
    daily: BTreeMap<NaiveDate, f64>,
}

impl PrecipitationFold {
    pub fn push(&mut self, record: &WeatherRecord) {
        self.total += record.one_hour_precip;
        self.readings += 1;
        if let Some(date) = record.date() {
            *self.daily.entry(date).or_insert(0.0) += record.one_hour_precip;
        }
    }

    pub fn finish(self, station_id: &str, year: i32) -> Option<Precipitation> {
        if self.readings == 0 {
            return None;
        }

        Some(Precipitation {
            station_id: station_id.to_string(),
            year,
            total: self.total,
            readings: self.readings,
            daily: self
                .daily
                .into_iter()
                .map(|(date, total)| DailyPrecipitation { date, total })
                .collect(),
        })
    }
}
