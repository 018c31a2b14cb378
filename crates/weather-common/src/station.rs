//! Weather station reference data.

use serde::{Deserialize, Serialize};

/// Descriptive metadata for one reporting station. Read-only to this system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherStation {
    /// Composite USAF:WBAN style identifier, e.g. "725030:14732"
    pub id: String,
    pub name: String,
    pub country_code: String,
    pub call_sign: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in metres
    pub elevation: f64,
}

impl WeatherStation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        country_code: impl Into<String>,
        call_sign: impl Into<String>,
        latitude: f64,
        longitude: f64,
        elevation: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country_code: country_code.into(),
            call_sign: call_sign.into(),
            latitude,
            longitude,
            elevation,
        }
    }
}
