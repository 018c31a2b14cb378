//! Caller-facing request/response protocol and routing to workers.

use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use weather_common::{
    Aggregate, ComputeRequest, Correlated, Precipitation, StationLookup, StationRequest,
    Temperature, TopKPrecipitation, WeatherError, WeatherResult,
};

use crate::mailbox::{Reply, ReplyTo, WorkerHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WeatherRequest {
    /// `day` is the 1-based day of year
    GetDailyTemperature { station: String, day: u32, year: i32 },
    GetMonthlyTemperature { station: String, month: u32, year: i32 },
    GetPrecipitation { station: String, year: i32 },
    /// The `k` wettest days of the year
    GetTopKPrecipitation { station: String, year: i32, k: usize },
    GetWeatherStation { station: String },
}

impl WeatherRequest {
    pub fn station(&self) -> &str {
        match self {
            WeatherRequest::GetDailyTemperature { station, .. }
            | WeatherRequest::GetMonthlyTemperature { station, .. }
            | WeatherRequest::GetPrecipitation { station, .. }
            | WeatherRequest::GetTopKPrecipitation { station, .. }
            | WeatherRequest::GetWeatherStation { station } => station,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "result")]
pub enum WeatherResponse {
    Temperature(Aggregate<Temperature>),
    Precipitation(Aggregate<Precipitation>),
    TopKPrecipitation(Aggregate<TopKPrecipitation>),
    Station(StationLookup),
}

impl WeatherResponse {
    /// `"ok"`, `"no_data"` or `"not_found"`.
    pub fn status(&self) -> &'static str {
        let empty = match self {
            WeatherResponse::Temperature(a) => a.is_no_data(),
            WeatherResponse::Precipitation(a) => a.is_no_data(),
            WeatherResponse::TopKPrecipitation(a) => a.is_no_data(),
            WeatherResponse::Station(StationLookup::NotFound) => return "not_found",
            WeatherResponse::Station(StationLookup::Found(_)) => false,
        };
        if empty {
            "no_data"
        } else {
            "ok"
        }
    }
}

type TemperatureHandle = WorkerHandle<ComputeRequest, Aggregate<Temperature>>;
type PrecipitationHandle = WorkerHandle<ComputeRequest, Aggregate<Precipitation>>;
type StationHandle = WorkerHandle<StationRequest, StationLookup>;

/// A request accepted by a worker mailbox whose reply is still pending.
struct Pending {
    request_id: Uuid,
    response: BoxFuture<'static, WeatherResult<WeatherResponse>>,
}

/// Routes protocol requests to the worker responsible for them.
#[derive(Clone)]
pub struct Dispatcher {
    temperature: TemperatureHandle,
    daily: HashMap<i32, TemperatureHandle>,
    precipitation: PrecipitationHandle,
    station: StationHandle,
}

impl Dispatcher {
    pub fn new(
        temperature: TemperatureHandle,
        daily: HashMap<i32, TemperatureHandle>,
        precipitation: PrecipitationHandle,
        station: StationHandle,
    ) -> Self {
        Self {
            temperature,
            daily,
            precipitation,
            station,
        }
    }

    /// Send `request` and wait for its response.
    pub async fn ask(&self, request: WeatherRequest) -> WeatherResult<WeatherResponse> {
        self.enqueue(request).await?.response.await
    }

    /// Send `request` and deliver its response to `reply_to` once computed.
    /// Returns the id the reply will carry.
    pub async fn submit(
        &self,
        request: WeatherRequest,
        reply_to: ReplyTo<WeatherResponse>,
    ) -> WeatherResult<Uuid> {
        let Pending {
            request_id,
            response,
        } = self.enqueue(request).await?;

        tokio::spawn(async move {
            let result = response.await;
            reply_to.deliver(Reply { request_id, result }).await;
        });

        Ok(request_id)
    }

    async fn enqueue(&self, request: WeatherRequest) -> WeatherResult<Pending> {
        match request {
            WeatherRequest::GetDailyTemperature { station, day, year } => {
                let handle = self.daily.get(&year).unwrap_or(&self.temperature);
                debug!(station = %station, year = year, worker = handle.role(), "Routing daily request");
                enqueue(
                    handle,
                    ComputeRequest::daily(station, year, day),
                    WeatherResponse::Temperature,
                )
                .await
            }
            WeatherRequest::GetMonthlyTemperature {
                station,
                month,
                year,
            } => {
                enqueue(
                    &self.temperature,
                    ComputeRequest::monthly(station, year, month),
                    WeatherResponse::Temperature,
                )
                .await
            }
            WeatherRequest::GetPrecipitation { station, year } => {
                enqueue(
                    &self.precipitation,
                    ComputeRequest::yearly(station, year),
                    WeatherResponse::Precipitation,
                )
                .await
            }
            WeatherRequest::GetTopKPrecipitation { station, year, k } => {
                if k == 0 {
                    return Err(WeatherError::InvalidRequest(
                        "k must be at least 1".to_string(),
                    ));
                }
                enqueue(
                    &self.precipitation,
                    ComputeRequest::yearly(station, year),
                    move |aggregate: Aggregate<Precipitation>| {
                        WeatherResponse::TopKPrecipitation(aggregate.map(|p| p.top_k(k)))
                    },
                )
                .await
            }
            WeatherRequest::GetWeatherStation { station } => {
                enqueue(
                    &self.station,
                    StationRequest::new(station),
                    WeatherResponse::Station,
                )
                .await
            }
        }
    }
}

async fn enqueue<Req, Out, F>(
    handle: &WorkerHandle<Req, Out>,
    request: Req,
    into_response: F,
) -> WeatherResult<Pending>
where
    Req: Correlated,
    Out: Send + 'static,
    F: FnOnce(Out) -> WeatherResponse + Send + 'static,
{
    let request_id = request.request_id();
    let role = handle.role();
    let (tx, rx) = oneshot::channel();
    handle.send(request, ReplyTo::Once(tx)).await?;

    let response = async move {
        let reply = rx.await.map_err(|_| {
            WeatherError::WorkerUnavailable(format!("{} worker dropped the reply", role))
        })?;
        reply.result.map(into_response)
    }
    .boxed();

    Ok(Pending {
        request_id,
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request: WeatherRequest = serde_json::from_str(
            r#"{"type": "GetMonthlyTemperature", "station": "S1", "month": 3, "year": 2024}"#,
        )
        .unwrap();

        assert_eq!(
            request,
            WeatherRequest::GetMonthlyTemperature {
                station: "S1".to_string(),
                month: 3,
                year: 2024
            }
        );
        assert_eq!(request.station(), "S1");
    }

    #[test]
    fn test_response_status() {
        assert_eq!(
            WeatherResponse::Temperature(Aggregate::NoData).status(),
            "no_data"
        );
        assert_eq!(
            WeatherResponse::Station(StationLookup::NotFound).status(),
            "not_found"
        );

        let json = serde_json::to_value(WeatherResponse::Precipitation(Aggregate::NoData)).unwrap();
        assert_eq!(json["type"], "Precipitation");
        assert_eq!(json["result"]["status"], "no_data");
    }
}
