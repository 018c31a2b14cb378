//! Error types for weather aggregation services.

use thiserror::Error;

/// Result type alias using WeatherError.
pub type WeatherResult<T> = Result<T, WeatherError>;

/// Primary error type for ingestion, storage and aggregation.
///
/// "No data" and "not found" are deliberately absent: an empty interval or an
/// unknown station is a legitimate answer, carried by
/// [`Aggregate::NoData`](crate::Aggregate) and
/// [`StationLookup::NotFound`](crate::StationLookup).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeatherError {
    // === Ingestion Errors ===
    #[error("Malformed observation: {0}")]
    Parse(String),

    // === Request Errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Storage Errors ===
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store rejected write: {0}")]
    StoreWriteRejected(String),

    #[error("Store returned {rows} rows for station {station_id}")]
    AmbiguousStation { station_id: String, rows: usize },

    #[error("Queue error: {0}")]
    QueueError(String),

    // === Infrastructure Errors ===
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl WeatherError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WeatherError::StoreUnavailable(_)
                | WeatherError::QueueError(_)
                | WeatherError::WorkerUnavailable(_)
        )
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            WeatherError::Parse(_) | WeatherError::InvalidRequest(_) => 400,

            WeatherError::StoreUnavailable(_)
            | WeatherError::QueueError(_)
            | WeatherError::WorkerUnavailable(_) => 503,

            _ => 500,
        }
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(err: serde_json::Error) -> Self {
        WeatherError::InternalError(format!("JSON error: {}", err))
    }
}
