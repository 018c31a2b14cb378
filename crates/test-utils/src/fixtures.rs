//! Common test fixtures for weather aggregation tests.
//!
//! Records default to a calm, dry hour so tests only set the fields they
//! assert on.

use std::sync::Arc;

use storage::{MemoryStore, ObservationStore};
use weather_common::{WeatherRecord, WeatherStation};

/// Station ids used across the suite.
pub mod stations {
    /// New York LaGuardia
    pub const LAGUARDIA: &str = "725030:14732";

    /// Chicago O'Hare
    pub const OHARE: &str = "725300:94846";

    /// Id with no metadata row
    pub const UNKNOWN: &str = "000000:00000";
}

/// A valid record for one station hour with neutral measurements.
pub fn record(station_id: &str, year: i32, month: u32, day: u32, hour: u32) -> WeatherRecord {
    WeatherRecord {
        station_id: station_id.to_string(),
        year,
        month,
        day,
        hour,
        temperature: 0.0,
        dewpoint: -5.0,
        pressure: 1013.2,
        wind_direction: 270,
        wind_speed: 3.6,
        sky_condition: 0,
        one_hour_precip: 0.0,
        six_hour_precip: 0.0,
    }
}

/// Render a record as a feed line in field order.
pub fn observation_line(record: &WeatherRecord) -> String {
    format!(
        "{},{},{:02},{:02},{:02},{},{},{},{},{},{},{},{}",
        record.station_id,
        record.year,
        record.month,
        record.day,
        record.hour,
        record.temperature,
        record.dewpoint,
        record.pressure,
        record.wind_direction,
        record.wind_speed,
        record.sky_condition,
        record.one_hour_precip,
        record.six_hour_precip,
    )
}

/// Feed lines that must each be dropped by the parser.
pub fn malformed_lines() -> Vec<String> {
    vec![
        String::new(),
        "725030:14732,2024,03,01".to_string(),
        "725030:14732,2024,03,01,05,warm,-7.8,1024.5,320,5.1,4,0.5,1.5".to_string(),
        ",2024,03,01,05,-2.8,-7.8,1024.5,320,5.1,4,0.5,1.5".to_string(),
        "725030:14732,2024,02,30,05,-2.8,-7.8,1024.5,320,5.1,4,0.5,1.5".to_string(),
        "725030:14732,2024,03,01,24,-2.8,-7.8,1024.5,320,5.1,4,0.5,1.5".to_string(),
        "725030:14732,2024,03,01,05,NaN,-7.8,1024.5,320,5.1,4,0.5,1.5".to_string(),
    ]
}

pub fn sample_station(id: &str) -> WeatherStation {
    match id {
        stations::LAGUARDIA => WeatherStation::new(
            id,
            "NEW YORK/LA GUARDIA",
            "US",
            "KLGA",
            40.779,
            -73.88,
            9.4,
        ),
        stations::OHARE => WeatherStation::new(
            id,
            "CHICAGO O'HARE INTERNATIONAL",
            "US",
            "KORD",
            41.995,
            -87.934,
            201.8,
        ),
        _ => WeatherStation::new(id, "TEST STATION", "ZZ", "XXXX", 0.0, 0.0, 0.0),
    }
}

/// A memory store holding `records` and the metadata of the two well-known
/// stations.
pub async fn populated_store(records: &[WeatherRecord]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for record in records {
        store
            .write(record)
            .await
            .unwrap_or_else(|e| panic!("fixture record rejected: {}", e));
    }
    store.insert_station(sample_station(stations::LAGUARDIA)).await;
    store.insert_station(sample_station(stations::OHARE)).await;
    store
}
