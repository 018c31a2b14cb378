//! Many concurrent callers against several workers sharing one store.

use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate};
use futures::future::join_all;
use test_utils::{assert_approx_eq, populated_store, synthetic_day};
use tokio_util::sync::CancellationToken;
use weather_common::{Aggregate, TemperatureFold, WeatherRecord};
use workers::{AggregationConfig, WeatherRequest, WeatherResponse, WorkerSet};

const STATIONS: [&str; 4] = ["S1", "S2", "S3", "S4"];

fn dataset() -> Vec<WeatherRecord> {
    let mut records = Vec::new();
    for (s, station) in STATIONS.iter().enumerate() {
        for day in 1..=25 {
            records.extend(synthetic_day(station, 2024, 2, day, s as f64 * 10.0 - day as f64));
        }
    }
    records
}

/// Single-threaded fold over the same rows.
fn reference(records: &[WeatherRecord], station: &str, date: NaiveDate) -> (f64, f64, f64) {
    let mut fold = TemperatureFold::default();
    for r in records
        .iter()
        .filter(|r| r.station_id == station && r.date() == Some(date))
    {
        fold.push(r.temperature);
    }
    let interval = weather_common::Interval::Day {
        year: date.year(),
        day_of_year: date.ordinal(),
    };
    let t = fold.finish(station, interval).unwrap();
    (t.high, t.low, t.mean)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hundred_concurrent_daily_requests_match_reference() {
    let records = dataset();
    let store = populated_store(&records).await;
    let config = AggregationConfig {
        daily_years: vec![2024],
        ..AggregationConfig::default()
    };
    let today = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
    let workers = WorkerSet::spawn(store, &config, today, &CancellationToken::new()).unwrap();
    let dispatcher = workers.dispatcher();

    let pairs: Vec<(&str, NaiveDate)> = STATIONS
        .iter()
        .flat_map(|station| {
            (1..=25).map(move |day| (*station, NaiveDate::from_ymd_opt(2024, 2, day).unwrap()))
        })
        .collect();
    assert_eq!(pairs.len(), 100);

    let tasks = pairs.iter().map(|&(station, date)| {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .ask(WeatherRequest::GetDailyTemperature {
                    station: station.to_string(),
                    day: date.ordinal(),
                    year: 2024,
                })
                .await
        })
    });
    let results = join_all(tasks).await;

    for (&(station, date), result) in pairs.iter().zip(results) {
        let response = result.unwrap().unwrap();
        let WeatherResponse::Temperature(Aggregate::Computed(temperature)) = response else {
            panic!("no temperature for {} on {}", station, date);
        };
        let (high, low, mean) = reference(&records, station, date);

        assert_eq!(temperature.station_id, station);
        assert_eq!(temperature.high, high);
        assert_eq!(temperature.low, low);
        assert_approx_eq!(temperature.mean, mean);
        assert_eq!(temperature.readings, 24);
    }

    workers.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_workers_query_in_parallel() {
    let store = populated_store(&dataset()).await;
    store.set_query_delay(Duration::from_millis(200));
    let workers = WorkerSet::spawn(
        store,
        &AggregationConfig::default(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        &CancellationToken::new(),
    )
    .unwrap();
    let dispatcher = workers.dispatcher();

    let started = Instant::now();
    let (temperature, precipitation) = tokio::join!(
        dispatcher.ask(WeatherRequest::GetMonthlyTemperature {
            station: "S1".to_string(),
            month: 2,
            year: 2024,
        }),
        dispatcher.ask(WeatherRequest::GetPrecipitation {
            station: "S1".to_string(),
            year: 2024,
        }),
    );

    assert_eq!(temperature.unwrap().status(), "ok");
    assert_eq!(precipitation.unwrap().status(), "ok");
    // Two slow queries on different workers overlap
    assert!(started.elapsed() < Duration::from_millis(390));

    workers.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_worker_serializes_its_own_requests() {
    let store = populated_store(&dataset()).await;
    store.set_query_delay(Duration::from_millis(100));
    let workers = WorkerSet::spawn(
        store,
        &AggregationConfig::default(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        &CancellationToken::new(),
    )
    .unwrap();
    let dispatcher = workers.dispatcher();

    let started = Instant::now();
    let requests = (0..3).map(|_| {
        dispatcher.ask(WeatherRequest::GetPrecipitation {
            station: "S2".to_string(),
            year: 2024,
        })
    });
    for result in join_all(requests).await {
        assert_eq!(result.unwrap().status(), "ok");
    }
    assert!(started.elapsed() >= Duration::from_millis(300));

    workers.stop().await;
}
