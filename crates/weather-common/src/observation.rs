//! Raw feed observations and the stored hourly weather record.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{WeatherError, WeatherResult};

/// Number of comma-separated fields in one feed line.
///
/// Layout: station id, year, month, day, hour, temperature, dewpoint,
/// pressure, wind direction, wind speed, sky condition, one-hour
/// precipitation, six-hour precipitation.
pub const OBSERVATION_FIELDS: usize = 13;

/// A feed line as delivered by the ingestion queue, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservation {
    line: String,
}

impl RawObservation {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Validate the line and convert it into a storable record.
    pub fn parse(&self) -> WeatherResult<WeatherRecord> {
        let fields: Vec<&str> = self.line.split(',').map(str::trim).collect();
        if fields.len() != OBSERVATION_FIELDS {
            return Err(WeatherError::Parse(format!(
                "expected {} fields, found {}",
                OBSERVATION_FIELDS,
                fields.len()
            )));
        }

        let station_id = fields[0];
        if station_id.is_empty() {
            return Err(WeatherError::Parse("empty station id".to_string()));
        }

        let record = WeatherRecord {
            station_id: station_id.to_string(),
            year: field(&fields, 1, "year")?,
            month: field(&fields, 2, "month")?,
            day: field(&fields, 3, "day")?,
            hour: field(&fields, 4, "hour")?,
            temperature: measurement(&fields, 5, "temperature")?,
            dewpoint: measurement(&fields, 6, "dewpoint")?,
            pressure: measurement(&fields, 7, "pressure")?,
            wind_direction: field(&fields, 8, "wind_direction")?,
            wind_speed: measurement(&fields, 9, "wind_speed")?,
            sky_condition: field(&fields, 10, "sky_condition")?,
            one_hour_precip: measurement(&fields, 11, "one_hour_precip")?,
            six_hour_precip: measurement(&fields, 12, "six_hour_precip")?,
        };

        record
            .validate_key()
            .map_err(|e| WeatherError::Parse(e.to_string()))?;

        Ok(record)
    }
}

fn field<T: FromStr>(fields: &[&str], idx: usize, name: &str) -> WeatherResult<T> {
    fields[idx]
        .parse()
        .map_err(|_| WeatherError::Parse(format!("{} is not numeric: '{}'", name, fields[idx])))
}

fn measurement(fields: &[&str], idx: usize, name: &str) -> WeatherResult<f64> {
    let value: f64 = field(fields, idx, name)?;
    if !value.is_finite() {
        return Err(WeatherError::Parse(format!("{} is not finite: '{}'", name, fields[idx])));
    }
    Ok(value)
}

/// One hourly observation as persisted in the store.
///
/// `(station_id, year, month, day, hour)` is the unique key; a second write
/// with the same key replaces the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub station_id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    /// Air temperature in degrees Celsius
    pub temperature: f64,
    pub dewpoint: f64,
    /// Sea level pressure in hPa
    pub pressure: f64,
    /// Degrees from north
    pub wind_direction: i32,
    pub wind_speed: f64,
    pub sky_condition: i32,
    /// Precipitation over the last hour, in millimetres
    pub one_hour_precip: f64,
    pub six_hour_precip: f64,
}

impl WeatherRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            station_id: self.station_id.clone(),
            year: self.year,
            month: self.month,
            day: self.day,
            hour: self.hour,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Check that the key names a real calendar hour.
    pub fn validate_key(&self) -> WeatherResult<()> {
        if self.station_id.is_empty() {
            return Err(WeatherError::StoreWriteRejected("empty station id".to_string()));
        }
        if self.date().is_none() {
            return Err(WeatherError::StoreWriteRejected(format!(
                "{}-{:02}-{:02} is not a calendar date",
                self.year, self.month, self.day
            )));
        }
        if self.hour > 23 {
            return Err(WeatherError::StoreWriteRejected(format!(
                "hour {} out of range",
                self.hour
            )));
        }
        Ok(())
    }
}

/// Unique key of a [`WeatherRecord`]. Orders by station, then time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub station_id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "725030:14732,2008,01,01,05,-2.8,-7.8,1024.5,320,5.1,4,0.5,1.5";

    #[test]
    fn test_parse_valid_line() {
        let record = RawObservation::new(VALID).parse().unwrap();

        assert_eq!(record.station_id, "725030:14732");
        assert_eq!(record.year, 2008);
        assert_eq!(record.month, 1);
        assert_eq!(record.day, 1);
        assert_eq!(record.hour, 5);
        assert_eq!(record.temperature, -2.8);
        assert_eq!(record.wind_direction, 320);
        assert_eq!(record.sky_condition, 4);
        assert_eq!(record.one_hour_precip, 0.5);
        assert_eq!(record.six_hour_precip, 1.5);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let line = " S1 , 2024, 3, 1, 0, 10.0, 1.0, 1000.0, 90, 2.0, 0, 0.0, 0.0 ";
        let record = RawObservation::new(line).parse().unwrap();
        assert_eq!(record.station_id, "S1");
        assert_eq!(record.temperature, 10.0);
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        let err = RawObservation::new("S1,2024,3,1,0,10.0").parse().unwrap_err();
        assert!(matches!(err, WeatherError::Parse(_)));
        assert!(err.to_string().contains("expected 13 fields, found 6"));
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let line = "S1,2024,3,1,0,warm,1.0,1000.0,90,2.0,0,0.0,0.0";
        let err = RawObservation::new(line).parse().unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_parse_rejects_non_finite() {
        let line = "S1,2024,3,1,0,NaN,1.0,1000.0,90,2.0,0,0.0,0.0";
        assert!(RawObservation::new(line).parse().is_err());
    }

    #[test]
    fn test_parse_rejects_impossible_date() {
        let line = "S1,2023,2,29,0,10.0,1.0,1000.0,90,2.0,0,0.0,0.0";
        assert!(matches!(
            RawObservation::new(line).parse(),
            Err(WeatherError::Parse(_))
        ));

        let line = "S1,2024,3,1,24,10.0,1.0,1000.0,90,2.0,0,0.0,0.0";
        assert!(RawObservation::new(line).parse().is_err());
    }

    #[test]
    fn test_parse_rejects_empty_station() {
        let line = ",2024,3,1,0,10.0,1.0,1000.0,90,2.0,0,0.0,0.0";
        assert!(RawObservation::new(line).parse().is_err());
    }

    #[test]
    fn test_key_ordering_follows_time() {
        let mut a = RawObservation::new(VALID).parse().unwrap();
        let mut b = a.clone();
        a.hour = 23;
        b.day = 2;
        b.hour = 0;
        assert!(a.key() < b.key());
    }
}
