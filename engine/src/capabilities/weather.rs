//! Weather forecast for coordinates found earlier in the plan
//!
//! Coordinates come only from a prior result's payload, never from the
//! request text. Inside the continental US the National Weather Service is
//! queried (`/points/{lat},{lon}` then its forecast URL); elsewhere the
//! Open-Meteo daily forecast is used.

use async_trait::async_trait;
use reqwest::Client;
use sdk::capability::{Capability, CapabilityContext};
use sdk::errors::EngineError;
use sdk::types::{CapabilityResult, PriorResults};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::network_error;

const NAME: &str = "weather";
const MAX_PERIODS: usize = 6;
const FORECAST_DAYS: &str = "3";

/// Capability whose payload is preferred as the coordinate source
const COORDINATE_SOURCE: &str = "search";

pub struct WeatherCapability {
    client: Client,
    nws_base_url: String,
    open_meteo_base_url: String,
}

#[derive(Debug, Deserialize)]
struct NwsPoints {
    properties: NwsPointProperties,
}

#[derive(Debug, Deserialize)]
struct NwsPointProperties {
    forecast: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NwsForecast {
    properties: NwsForecastProperties,
}

#[derive(Debug, Deserialize)]
struct NwsForecastProperties {
    #[serde(default)]
    periods: Vec<NwsPeriod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NwsPeriod {
    name: String,
    temperature: Option<f64>,
    temperature_unit: Option<String>,
    wind_speed: Option<String>,
    short_forecast: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    current_weather: Option<OpenMeteoCurrent>,
    daily: Option<OpenMeteoDaily>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrent {
    temperature: f64,
    windspeed: Option<f64>,
    weathercode: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoDaily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    weathercode: Vec<Option<u32>>,
}

impl WeatherCapability {
    pub fn new(client: Client, nws_base_url: &str, open_meteo_base_url: &str) -> Self {
        Self {
            client,
            nws_base_url: nws_base_url.trim_end_matches('/').to_string(),
            open_meteo_base_url: open_meteo_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn nws_periods(&self, latitude: f64, longitude: f64) -> Result<Vec<Value>, EngineError> {
        let points_url = format!("{}/points/{:.4},{:.4}", self.nws_base_url, latitude, longitude);
        let points: NwsPoints = self.get_json(&points_url, &[]).await?;

        let forecast_url = points
            .properties
            .forecast
            .ok_or_else(|| EngineError::capability(NAME, "no forecast URL for these coordinates"))?;
        let forecast: NwsForecast = self.get_json(&forecast_url, &[]).await?;

        Ok(forecast
            .properties
            .periods
            .into_iter()
            .take(MAX_PERIODS)
            .map(|p| {
                json!({
                    "name": p.name,
                    "temperature": p.temperature,
                    "temperature_unit": p.temperature_unit,
                    "wind_speed": p.wind_speed,
                    "forecast": p.short_forecast,
                })
            })
            .collect())
    }

    async fn open_meteo_periods(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<(Vec<Value>, Option<Value>), EngineError> {
        let url = format!("{}/v1/forecast", self.open_meteo_base_url);
        let latitude = latitude.to_string();
        let longitude = longitude.to_string();
        let response: OpenMeteoResponse = self
            .get_json(
                &url,
                &[
                    ("latitude", latitude.as_str()),
                    ("longitude", longitude.as_str()),
                    ("current_weather", "true"),
                    ("daily", "temperature_2m_max,temperature_2m_min,weathercode"),
                    ("timezone", "auto"),
                    ("forecast_days", FORECAST_DAYS),
                ],
            )
            .await?;

        let current = response.current_weather.map(|c| {
            json!({
                "temperature": c.temperature,
                "temperature_unit": "C",
                "wind_speed": c.windspeed.map(|w| format!("{} km/h", w)),
                "forecast": c.weathercode.map(describe_weather_code),
            })
        });

        let periods = response
            .daily
            .map(|daily| {
                daily
                    .time
                    .iter()
                    .enumerate()
                    .map(|(i, day)| {
                        json!({
                            "name": day,
                            "temperature_max": daily.temperature_2m_max.get(i).copied().flatten(),
                            "temperature_min": daily.temperature_2m_min.get(i).copied().flatten(),
                            "temperature_unit": "C",
                            "forecast": daily.weathercode.get(i).copied().flatten().map(describe_weather_code),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok((periods, current))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, EngineError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/geo+json, application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(EngineError::capability(
                NAME,
                format!("forecast service returned {}", response.status()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::capability(NAME, format!("bad forecast response: {}", e)))
    }
}

/// Coordinates from prior results: `search` first, then any other
/// successful result carrying both fields.
pub fn prior_coordinates(prior: &PriorResults) -> Option<(f64, f64)> {
    let coordinates =
        |r: &CapabilityResult| Some((r.payload_f64("latitude")?, r.payload_f64("longitude")?));

    prior
        .get(COORDINATE_SOURCE)
        .and_then(coordinates)
        .or_else(|| prior.values().find_map(coordinates))
}

/// Continental US bounding box served by the National Weather Service
pub fn within_nws_coverage(latitude: f64, longitude: f64) -> bool {
    (24.0..=49.0).contains(&latitude) && (-125.0..=-66.0).contains(&longitude)
}

/// WMO weather interpretation codes used by Open-Meteo
fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "Clear sky",
        1..=3 => "Partly cloudy",
        45 | 48 => "Fog",
        51..=57 => "Drizzle",
        61..=67 => "Rain",
        71..=77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95..=99 => "Thunderstorm",
        _ => "Unknown",
    }
}

#[async_trait]
impl Capability for WeatherCapability {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Weather forecast; needs latitude/longitude from search earlier in the plan"
    }

    async fn invoke(
        &self,
        _ctx: &CapabilityContext,
        _input: &str,
        prior: &PriorResults,
    ) -> Result<CapabilityResult, EngineError> {
        let Some((latitude, longitude)) = prior_coordinates(prior) else {
            return Ok(CapabilityResult::failure(
                NAME,
                "no coordinates available; search must locate the place first",
            ));
        };

        let mut payload = Map::new();
        payload.insert("latitude".to_string(), json!(latitude));
        payload.insert("longitude".to_string(), json!(longitude));

        if within_nws_coverage(latitude, longitude) {
            tracing::info!("NWS forecast for {:.4},{:.4}", latitude, longitude);
            let periods = self.nws_periods(latitude, longitude).await?;
            payload.insert("source".to_string(), json!("nws"));
            payload.insert("periods".to_string(), Value::Array(periods));
        } else {
            tracing::info!("Open-Meteo forecast for {:.4},{:.4}", latitude, longitude);
            let (periods, current) = self.open_meteo_periods(latitude, longitude).await?;
            payload.insert("source".to_string(), json!("open-meteo"));
            payload.insert("current".to_string(), current.unwrap_or(Value::Null));
            payload.insert("periods".to_string(), Value::Array(periods));
        }

        let empty = payload
            .get("periods")
            .and_then(|p| p.as_array())
            .map_or(true, |p| p.is_empty());
        if empty && payload.get("current").map_or(true, Value::is_null) {
            return Ok(CapabilityResult::failure(NAME, "forecast service returned no periods")
                .with_diagnostic("latitude", latitude)
                .with_diagnostic("longitude", longitude));
        }

        Ok(CapabilityResult::success(NAME, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior_with(name: &str, payload: Value) -> PriorResults {
        let mut prior = PriorResults::new();
        prior.insert(name.to_string(), CapabilityResult::from_json(name, payload));
        prior
    }

    #[test]
    fn test_prior_coordinates_prefers_search() {
        let mut prior = prior_with("search", json!({"latitude": 48.85, "longitude": 2.35}));
        prior.insert(
            "atlas".to_string(),
            CapabilityResult::from_json("atlas", json!({"latitude": 1.0, "longitude": 1.0})),
        );
        assert_eq!(prior_coordinates(&prior), Some((48.85, 2.35)));
    }

    #[test]
    fn test_prior_coordinates_ignores_failed_results() {
        let mut prior = PriorResults::new();
        prior.insert(
            "search".to_string(),
            CapabilityResult::failure("search", "no results")
                .with_diagnostic("latitude", 48.85)
                .with_diagnostic("longitude", 2.35),
        );
        assert_eq!(prior_coordinates(&prior), None);

        let prior = prior_with("atlas", json!({"latitude": "40.7", "longitude": "-74.0"}));
        assert_eq!(prior_coordinates(&prior), Some((40.7, -74.0)));
    }

    #[test]
    fn test_nws_coverage_box() {
        assert!(within_nws_coverage(40.71, -74.0));
        assert!(within_nws_coverage(24.0, -125.0));
        assert!(!within_nws_coverage(48.85, 2.35));
        assert!(!within_nws_coverage(61.2, -149.9));
    }

    #[tokio::test]
    async fn test_missing_coordinates_is_declared_failure() {
        let capability = WeatherCapability::new(Client::new(), "http://unused", "http://unused");
        let result = capability
            .invoke(&CapabilityContext::new("s"), "weather", &PriorResults::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no coordinates"));
    }

    #[test]
    fn test_weather_codes() {
        assert_eq!(describe_weather_code(0), "Clear sky");
        assert_eq!(describe_weather_code(63), "Rain");
        assert_eq!(describe_weather_code(200), "Unknown");
    }
}
