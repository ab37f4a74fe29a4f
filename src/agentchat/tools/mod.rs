//! Built-in Tool Implementations
//!
//! Functions participants can call through the tool protocol system.
//!
//! # Available Tools
//!
//! - **DateTimeTool** (`datetime` protocol)
//!   - `get_datetime`: current UTC time in RFC 1123 form
//!   - `get_date_difference`: whole days between two `YYYY-MM-DD` dates
//!   - Injectable clock for deterministic tests
//!
//! - **WeatherTool** (`weather` protocol)
//!   - `get_weather`: hourly Open-Meteo forecast (temperature, precipitation, precipitation probability)
//!   - Configurable location and timezone, Seattle by default
//!
//! # Integration with Agents
//!
//! ```ignore
//! use agentchat::tools::{DateTimeTool, WeatherTool};
//! use agentchat::tool_protocol::ToolRegistry;
//! use std::sync::Arc;
//!
//! let mut registry = ToolRegistry::new();
//! registry.add_protocol(Arc::new(DateTimeTool::new())).await?;
//! registry.add_protocol(Arc::new(WeatherTool::new())).await?;
//!
//! let weather_agent = Agent::new("WeatherAgent", client.clone())
//!     .with_allowed_tools(&registry, &["weather", "datetime"])?;
//! let scheduling_agent = Agent::new("SchedulingAgent", client)
//!     .with_allowed_tools(&registry, &["datetime"])?;
//! ```

pub mod datetime;
pub mod weather;

pub use datetime::DateTimeTool;
pub use weather::{HourlyForecast, WeatherTool};
