//! Synthetic observation generators.
//!
//! These generators create predictable, verifiable series that can be used
//! across the test suite.

use weather_common::WeatherRecord;

use crate::fixtures::record;

/// One record per hour of a day, hour 0 first, with the given temperatures.
///
/// # Panics
///
/// If more than 24 temperatures are given.
pub fn hourly_temperatures(
    station_id: &str,
    year: i32,
    month: u32,
    day: u32,
    temperatures: &[f64],
) -> Vec<WeatherRecord> {
    assert!(temperatures.len() <= 24, "a day has 24 hours");
    temperatures
        .iter()
        .enumerate()
        .map(|(hour, &temperature)| {
            let mut r = record(station_id, year, month, day, hour as u32);
            r.temperature = temperature;
            r
        })
        .collect()
}

/// A full day of readings whose temperature is `base + hour / 4` and whose
/// one-hour precipitation is `(hour % 3) * 0.1`.
///
/// Every (station, day) gets a distinct value pattern, which makes it easy
/// to tell results apart in concurrency tests.
pub fn synthetic_day(station_id: &str, year: i32, month: u32, day: u32, base: f64) -> Vec<WeatherRecord> {
    (0..24)
        .map(|hour| {
            let mut r = record(station_id, year, month, day, hour);
            r.temperature = base + hour as f64 / 4.0;
            r.one_hour_precip = (hour % 3) as f64 * 0.1;
            r
        })
        .collect()
}

/// A deterministic permutation of `items`: odd positions first (reversed),
/// then even positions.
pub fn interleave<T: Clone>(items: &[T]) -> Vec<T> {
    let odd = items.iter().skip(1).step_by(2).rev();
    let even = items.iter().step_by(2);
    odd.chain(even).cloned().collect()
}
