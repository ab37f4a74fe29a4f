use agentchat::tool_protocol::{ToolProtocol, ToolRegistry};
use agentchat::tools::weather::{parse_forecast, HOURS_RETURNED};
use agentchat::tools::{DateTimeTool, WeatherTool};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

fn fixed_clock_tool() -> DateTimeTool {
    DateTimeTool::with_clock(Arc::new(|| {
        Utc.with_ymd_and_hms(2025, 10, 14, 10, 0, 0).unwrap()
    }))
}

#[tokio::test]
async fn test_get_datetime_is_rfc1123() {
    let result = fixed_clock_tool()
        .execute("get_datetime", serde_json::json!({}))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.output, serde_json::json!("Tue, 14 Oct 2025 10:00:00 GMT"));
}

#[tokio::test]
async fn test_get_date_difference() {
    let tool = fixed_clock_tool();

    let forward = tool
        .execute(
            "get_date_difference",
            serde_json::json!({ "start": "2025-01-01", "end": "2025-03-01" }),
        )
        .await
        .unwrap();
    assert_eq!(forward.output, serde_json::json!(59));

    let backward = tool
        .execute(
            "get_date_difference",
            serde_json::json!({ "start": "2024-03-01", "end": "2024-02-01" }),
        )
        .await
        .unwrap();
    assert_eq!(backward.output, serde_json::json!(-29));

    let invalid = tool
        .execute(
            "get_date_difference",
            serde_json::json!({ "start": "yesterday", "end": "2025-03-01" }),
        )
        .await
        .unwrap();
    assert!(!invalid.success);
    assert!(invalid.error.unwrap().contains("YYYY-MM-DD"));
}

#[tokio::test]
async fn test_unknown_datetime_function_is_not_found() {
    assert!(fixed_clock_tool()
        .execute("get_timezone", serde_json::json!({}))
        .await
        .is_err());
}

#[tokio::test]
async fn test_registry_routes_to_both_protocols() {
    let mut registry = ToolRegistry::new();
    registry
        .add_protocol(Arc::new(fixed_clock_tool()))
        .await
        .unwrap();
    registry
        .add_protocol(Arc::new(WeatherTool::new()))
        .await
        .unwrap();

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.get_tool("get_weather").unwrap().protocol_name(), "weather");
    let catalogue = registry.catalogue();
    assert!(catalogue.contains("- get_date_difference(start: string (required)"));
    assert!(catalogue.contains("- get_weather(days: integer (default 1)"));

    let now = registry
        .execute_tool("get_datetime", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(now.output, serde_json::json!("Tue, 14 Oct 2025 10:00:00 GMT"));
}

#[test]
fn test_parse_forecast_truncates_to_a_day() {
    let times: Vec<String> = (0..48).map(|h| format!("2025-10-14T{:02}:00", h % 24)).collect();
    let temps: Vec<f64> = (0..48).map(|h| 50.0 + h as f64).collect();
    let body = serde_json::json!({
        "latitude": 47.6,
        "longitude": -122.3,
        "hourly": {
            "time": times,
            "temperature_2m": temps,
            "precipitation_probability": vec![10.0; 48],
            "precipitation": vec![0.0; 48],
        }
    })
    .to_string();

    let points = parse_forecast(&body).unwrap();
    assert_eq!(points.len(), HOURS_RETURNED);
    assert_eq!(points[0].timestamp, "2025-10-14T00:00");
    assert_eq!(points[23].temperature, Some(73.0));
    assert_eq!(points[5].precipitation_probability, Some(10.0));
}

#[test]
fn test_parse_forecast_keeps_missing_values_empty() {
    let body = r#"{
        "hourly": {
            "time": ["2025-10-14T00:00", "2025-10-14T01:00"],
            "temperature_2m": [51.2, null],
            "precipitation": [0.01]
        }
    }"#;

    let points = parse_forecast(body).unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].temperature, Some(51.2));
    assert_eq!(points[1].temperature, None);
    assert_eq!(points[1].precipitation, None);
    assert_eq!(points[0].precipitation_probability, None);
}

#[test]
fn test_parse_forecast_rejects_unexpected_payload() {
    assert!(parse_forecast(r#"{"error": true, "reason": "bad latitude"}"#).is_err());
}

#[test]
fn test_forecast_url_uses_location_and_days() {
    let url = WeatherTool::new()
        .with_location(52.52, 13.41)
        .with_timezone("Europe/Berlin")
        .with_base_url("http://localhost:8080/")
        .forecast_url(3);
    assert!(url.starts_with("http://localhost:8080/v1/forecast?latitude=52.52&longitude=13.41"));
    assert!(url.contains("timezone=Europe%2FBerlin"));
    assert!(url.ends_with("forecast_days=3"));
}
