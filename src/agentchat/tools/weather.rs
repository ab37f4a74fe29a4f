//! Hourly weather forecast from the Open-Meteo API.
//!
//! `get_weather(days)` fetches an hourly forecast (°F, inches, mph) for a fixed location
//! and hands the first 24 points back to the model. Parsing is kept separate from the
//! HTTP call so it can be exercised offline.

use crate::agentchat::clients::common::get_http_client;
use crate::agentchat::tool_protocol::{
    ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol, ToolResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";

/// Points returned to the model per call.
pub const HOURS_RETURNED: usize = 24;

/// Open-Meteo accepts 1..=16 forecast days.
pub const MAX_FORECAST_DAYS: u64 = 16;

/// One hourly forecast point as handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub timestamp: String,
    /// Degrees Fahrenheit.
    pub temperature: Option<f64>,
    /// Inches.
    pub precipitation: Option<f64>,
    /// Percent.
    pub precipitation_probability: Option<f64>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    hourly: HourlySeries,
}

#[derive(Deserialize)]
struct HourlySeries {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
}

/// Turn an Open-Meteo hourly response body into at most [`HOURS_RETURNED`] points.
pub fn parse_forecast(body: &str) -> Result<Vec<HourlyForecast>, ToolError> {
    let response: ForecastResponse = serde_json::from_str(body)
        .map_err(|e| ToolError::ExecutionFailed(format!("unexpected forecast payload: {}", e)))?;
    let series = response.hourly;
    fn at(values: &[Option<f64>], i: usize) -> Option<f64> {
        values.get(i).copied().flatten()
    }

    Ok(series
        .time
        .iter()
        .take(HOURS_RETURNED)
        .enumerate()
        .map(|(i, timestamp)| HourlyForecast {
            timestamp: timestamp.clone(),
            temperature: at(&series.temperature_2m, i),
            precipitation: at(&series.precipitation, i),
            precipitation_probability: at(&series.precipitation_probability, i),
        })
        .collect())
}

/// `weather` protocol: `get_weather`.
#[derive(Debug, Clone)]
pub struct WeatherTool {
    base_url: String,
    latitude: f64,
    longitude: f64,
    timezone: String,
    timeout: Duration,
}

impl WeatherTool {
    /// Seattle, `America/Los_Angeles`.
    pub fn new() -> Self {
        Self {
            base_url: OPEN_METEO_BASE_URL.to_string(),
            latitude: 47.6062,
            longitude: -122.3321,
            timezone: "America/Los_Angeles".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    /// IANA zone name, e.g. `Europe/Berlin`.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Point at a different Open-Meteo compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn forecast_url(&self, days: u64) -> String {
        format!(
            "{}/v1/forecast?latitude={}&longitude={}\
             &hourly=temperature_2m,precipitation_probability,precipitation\
             &temperature_unit=fahrenheit&wind_speed_unit=mph&precipitation_unit=inch\
             &timezone={}&temporal_resolution=hourly_1&forecast_days={}",
            self.base_url,
            self.latitude,
            self.longitude,
            urlencoding::encode(&self.timezone),
            days
        )
    }

    /// Fetch and parse the forecast for `days` days.
    pub async fn forecast(&self, days: u64) -> Result<Vec<HourlyForecast>, ToolError> {
        if !(1..=MAX_FORECAST_DAYS).contains(&days) {
            return Err(ToolError::InvalidParameters(format!(
                "days must be between 1 and {}, got {}",
                MAX_FORECAST_DAYS, days
            )));
        }

        let url = self.forecast_url(days);
        log::debug!("agentchat::tools::weather::WeatherTool::forecast(...): GET {}", url);
        let response = get_http_client(&self.base_url, self.timeout)
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("weather request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("weather body unreadable: {}", e)))?;
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "weather service answered {}: {}",
                status, body
            )));
        }
        parse_forecast(&body)
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for WeatherTool {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        if tool_name != "get_weather" {
            return Err(Box::new(ToolError::NotFound(tool_name.to_string())));
        }
        let days = match &parameters["days"] {
            serde_json::Value::Null => 1,
            value => match value.as_u64() {
                Some(days) => days,
                None => {
                    return Ok(ToolResult::failure(format!(
                        "days must be a positive integer, got {}",
                        value
                    )))
                }
            },
        };

        match self.forecast(days).await {
            Ok(points) => Ok(ToolResult::success(serde_json::to_value(&points)?)
                .with_metadata("url", serde_json::json!(self.forecast_url(days)))),
            Err(e) => {
                log::warn!("agentchat::tools::weather::WeatherTool::execute(...): {}", e);
                Ok(ToolResult::failure(e.to_string()))
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![ToolMetadata::new(
            "get_weather",
            "Gets the hourly weather forecast: temperature (F), precipitation (inches) and precipitation probability",
        )
        .with_parameter(
            ToolParameter::new("days", ToolParameterType::Integer)
                .with_description("Number of forecast days")
                .with_default(serde_json::json!(1)),
        )])
    }

    fn protocol_name(&self) -> &str {
        "weather"
    }
}
