//! Reads live tank volumes from the automatic tank gauge (ATG).

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, fuel_type::fuel_type_for_oil_type};

/// A point-in-time reading of one tank.
#[derive(Debug, Clone, PartialEq)]
pub struct TankReading {
    /// The fuel type code of the fuel in the tank.
    pub fuel_type: String,
    /// The litres in the tank when the reading was taken.
    pub volume: f64,
}

/// A source of live tank readings.
#[async_trait::async_trait]
pub trait TankGauge: Send + Sync {
    /// Read the current volume and fuel type of tank `tank_no`.
    ///
    /// # Errors
    /// Returns [Error::Unavailable] if the gauge cannot be reached, does not
    /// answer in time, or does not report a volume for the tank, and
    /// [Error::UnmappedOilType] if the tank's oil type has no fuel type code.
    async fn read_tank(&self, tank_no: i64) -> Result<TankReading, Error>;
}

/// Reads tanks from the gauge's HTTP feed.
///
/// The feed is queried with an empty POST and answers with every tank it
/// knows about: `{ "data": [ { "id": 1, "oilType": "HSD", "volume": 1234.5 } ] }`.
#[derive(Debug, Clone)]
pub struct HttpTankGauge {
    http: reqwest::Client,
    tank_data_url: String,
}

impl HttpTankGauge {
    /// Create a gauge client for the feed at `tank_data_url`.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be created (e.g., the TLS backend fails to initialise).
    pub fn new(tank_data_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            tank_data_url: tank_data_url.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GaugeResponse {
    data: Vec<GaugeTank>,
}

#[derive(Debug, Deserialize)]
struct GaugeTank {
    id: Value,
    #[serde(rename = "oilType")]
    oil_type: Option<String>,
    volume: Option<f64>,
}

impl GaugeTank {
    /// The gauge may report tank IDs as numbers or strings.
    fn is_tank(&self, tank_no: i64) -> bool {
        match &self.id {
            Value::Number(id) => id.as_i64() == Some(tank_no),
            Value::String(id) => id.trim() == tank_no.to_string(),
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl TankGauge for HttpTankGauge {
    async fn read_tank(&self, tank_no: i64) -> Result<TankReading, Error> {
        let response = self
            .http
            .post(&self.tank_data_url)
            .send()
            .await
            .map_err(|error| Error::Unavailable(format!("tank gauge request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Unavailable(format!(
                "tank gauge responded with status {status}"
            )));
        }

        let body: GaugeResponse = response.json().await.map_err(|error| {
            Error::Unavailable(format!("could not decode tank gauge response: {error}"))
        })?;

        let tank = body
            .data
            .into_iter()
            .find(|tank| tank.is_tank(tank_no))
            .ok_or_else(|| {
                Error::Unavailable(format!("the tank gauge did not report tank {tank_no}"))
            })?;

        let volume = tank.volume.ok_or_else(|| {
            Error::Unavailable(format!("the tank gauge did not report a volume for tank {tank_no}"))
        })?;

        let oil_type = tank.oil_type.unwrap_or_default();
        let fuel_type = match fuel_type_for_oil_type(&oil_type) {
            Some(fuel_type) => fuel_type.to_owned(),
            None => {
                tracing::warn!("Tank {tank_no} reported unknown oil type {oil_type:?}");
                return Err(Error::UnmappedOilType(oil_type));
            }
        };

        tracing::debug!("Tank {tank_no} reading: {volume} L of {fuel_type}");

        Ok(TankReading { fuel_type, volume })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use crate::Error;

    use super::{HttpTankGauge, TankGauge, TankReading};

    const TANK_DATA_PATH: &str = "/baseOilcan";

    fn gauge_body() -> serde_json::Value {
        json!({
            "data": [
                { "id": 1, "oilType": "Petrol 92", "volume": 5120.25 },
                { "id": "2", "oilType": "HSD", "volume": 830.0 },
                { "id": 3, "oilType": "Kerosene", "volume": 20.0 },
                { "id": 4, "oilType": "PHSD" }
            ]
        })
    }

    fn get_test_gauge(server: &MockServer) -> HttpTankGauge {
        HttpTankGauge::new(&server.url(TANK_DATA_PATH), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn reads_tank_with_numeric_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(TANK_DATA_PATH);
                then.status(200).json_body(gauge_body());
            })
            .await;

        let got = get_test_gauge(&server).read_tank(1).await;

        mock.assert_async().await;
        assert_eq!(
            got,
            Ok(TankReading {
                fuel_type: "001-Octane Ron(92)".to_owned(),
                volume: 5120.25,
            })
        );
    }

    #[tokio::test]
    async fn reads_tank_with_string_id() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TANK_DATA_PATH);
                then.status(200).json_body(gauge_body());
            })
            .await;

        let got = get_test_gauge(&server).read_tank(2).await;

        assert_eq!(
            got,
            Ok(TankReading {
                fuel_type: "004-Diesel".to_owned(),
                volume: 830.0,
            })
        );
    }

    #[tokio::test]
    async fn missing_tank_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TANK_DATA_PATH);
                then.status(200).json_body(gauge_body());
            })
            .await;

        let got = get_test_gauge(&server).read_tank(7).await;

        assert!(
            matches!(got, Err(Error::Unavailable(_))),
            "want unavailable error, got {got:?}"
        );
    }

    #[tokio::test]
    async fn missing_volume_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TANK_DATA_PATH);
                then.status(200).json_body(gauge_body());
            })
            .await;

        let got = get_test_gauge(&server).read_tank(4).await;

        assert!(
            matches!(got, Err(Error::Unavailable(_))),
            "want unavailable error, got {got:?}"
        );
    }

    #[tokio::test]
    async fn unknown_oil_type_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TANK_DATA_PATH);
                then.status(200).json_body(gauge_body());
            })
            .await;

        let got = get_test_gauge(&server).read_tank(3).await;

        assert_eq!(got, Err(Error::UnmappedOilType("Kerosene".to_owned())));
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TANK_DATA_PATH);
                then.status(500);
            })
            .await;

        let got = get_test_gauge(&server).read_tank(1).await;

        assert!(
            matches!(got, Err(Error::Unavailable(_))),
            "want unavailable error, got {got:?}"
        );
    }

    #[tokio::test]
    async fn slow_gauge_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(TANK_DATA_PATH);
                then.status(200)
                    .json_body(gauge_body())
                    .delay(Duration::from_millis(500));
            })
            .await;
        let gauge = HttpTankGauge::new(&server.url(TANK_DATA_PATH), Duration::from_millis(50));

        let got = gauge.read_tank(1).await;

        assert!(
            matches!(got, Err(Error::Unavailable(_))),
            "want unavailable error, got {got:?}"
        );
    }
}
