//! Tool registry: lookup by name, input validation, collision rejection.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::TrellisError;

use super::builtin::{CalculatorTool, CalendarTool, WeatherTool, WebSearchTool};
use super::Tool;

/// Named tool collection. Registration rejects duplicate names.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the standard set: calculator, calendar,
    /// weather, web_search.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        for tool in [
            Arc::new(CalculatorTool) as Arc<dyn Tool>,
            Arc::new(CalendarTool),
            Arc::new(WeatherTool),
            Arc::new(WebSearchTool),
        ] {
            // Builtins have unique names; a collision here is a programmer error.
            if let Err(e) = registry.register(tool) {
                unreachable!("builtin tool collision: {}", e);
            }
        }
        registry
    }

    /// Registers a tool under its unique name; collisions are rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), TrellisError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(TrellisError::Validation(format!(
                "tool already registered: {}",
                name
            )));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validates params against the tool's schema: object shape, required
    /// keys present, declared primitive types respected.
    pub fn validate_tool_input(&self, name: &str, params: &Value) -> Result<(), TrellisError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| TrellisError::NotFound(format!("unknown tool: {}", name)))?;
        let schema = tool.schema();

        let object = params.as_object().ok_or_else(|| {
            TrellisError::Validation(format!("{} input must be an object", name))
        })?;

        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for key in required.iter().filter_map(|k| k.as_str()) {
                if !object.contains_key(key) {
                    return Err(TrellisError::Validation(format!(
                        "{} input missing required field: {}",
                        name, key
                    )));
                }
            }
        }

        if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
            for (key, value) in object {
                let Some(declared) = properties.get(key).and_then(|p| p.get("type")) else {
                    continue;
                };
                let ok = match declared.as_str() {
                    Some("string") => value.is_string(),
                    Some("number") => value.is_number(),
                    Some("integer") => value.is_i64() || value.is_u64(),
                    Some("boolean") => value.is_boolean(),
                    _ => true,
                };
                if !ok {
                    return Err(TrellisError::Validation(format!(
                        "{} input field {} has wrong type (expected {})",
                        name, key, declared
                    )));
                }
            }
        }

        Ok(())
    }
}
