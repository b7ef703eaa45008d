//! Named tools with typed input validation and per-tool fallback.

mod builtin;
mod registry;

pub use builtin::{CalculatorTool, CalendarTool, WeatherTool, WebSearchTool};
pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TrellisError;

/// A callable tool.
///
/// `execute` does the work; `fallback` produces the canned response used when
/// execution fails for good. Real backends (weather services, search APIs)
/// are external collaborators wired in behind implementations of this trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    /// JSON schema for the input parameters.
    fn schema(&self) -> Value;

    async fn execute(&self, params: &Value) -> Result<String, TrellisError>;

    /// Canned response for exhausted failures. Never fails.
    fn fallback(&self, params: &Value, error: &TrellisError) -> String;
}
