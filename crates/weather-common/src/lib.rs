//! Common types and utilities shared across the weather aggregation services.

pub mod aggregate;
pub mod error;
pub mod interval;
pub mod observation;
pub mod station;

pub use aggregate::{
    Aggregate, DailyPrecipitation, Precipitation, PrecipitationFold, StationLookup, Temperature,
    TemperatureFold, TopKPrecipitation,
};
pub use error::{WeatherError, WeatherResult};
pub use interval::{elapsed_days, ComputeRequest, Correlated, Interval, RecordFilter, StationRequest};
pub use observation::{RawObservation, RecordKey, WeatherRecord, OBSERVATION_FIELDS};
pub use station::WeatherStation;
