//! Clock and date arithmetic functions.
//!
//! ```rust
//! use agentchat::tools::DateTimeTool;
//!
//! let tool = DateTimeTool::new();
//! assert_eq!(tool.date_difference("2025-01-01", "2025-03-01").unwrap(), 59);
//! ```

use crate::agentchat::tool_protocol::{
    ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol, ToolResult,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::error::Error;
use std::sync::Arc;

/// Source of "now", swappable in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// `datetime` protocol: `get_datetime` and `get_date_difference`.
#[derive(Clone)]
pub struct DateTimeTool {
    clock: Clock,
}

impl DateTimeTool {
    /// Tool backed by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    /// Current UTC time, e.g. `Tue, 14 Oct 2025 10:00:00 GMT`.
    pub fn now_rfc1123(&self) -> String {
        (self.clock)().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Whole days from `start` to `end`; negative when `end` comes first.
    pub fn date_difference(&self, start: &str, end: &str) -> Result<i64, ToolError> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        Ok((end - start).num_days())
    }
}

impl Default for DateTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        ToolError::InvalidParameters(format!("{:?} is not a YYYY-MM-DD date: {}", value, e))
    })
}

#[async_trait]
impl ToolProtocol for DateTimeTool {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        match tool_name {
            "get_datetime" => Ok(ToolResult::success(serde_json::json!(self.now_rfc1123()))),
            "get_date_difference" => {
                let start = parameters["start"].as_str().unwrap_or_default();
                let end = parameters["end"].as_str().unwrap_or_default();
                match self.date_difference(start, end) {
                    Ok(days) => Ok(ToolResult::success(serde_json::json!(days))),
                    Err(e) => Ok(ToolResult::failure(e.to_string())),
                }
            }
            other => Err(Box::new(ToolError::NotFound(other.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![
            ToolMetadata::new(
                "get_datetime",
                "Retrieves the current date time in UTC (RFC 1123 format)",
            ),
            ToolMetadata::new(
                "get_date_difference",
                "Calculates the number of days between two dates",
            )
            .with_parameter(
                ToolParameter::new("start", ToolParameterType::String)
                    .with_description("Start date, YYYY-MM-DD")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("end", ToolParameterType::String)
                    .with_description("End date, YYYY-MM-DD")
                    .required(),
            ),
        ])
    }

    fn protocol_name(&self) -> &str {
        "datetime"
    }
}
