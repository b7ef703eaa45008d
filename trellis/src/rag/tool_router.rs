//! tool_router and run_tool nodes: pattern-based tool selection, validated
//! execution with timeout, retries, and per-tool fallback.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::TrellisError;
use crate::graph::{Next, Node, RunContext};
use crate::state::{AgentState, ToolResult};
use crate::tools::ToolRegistry;

use super::{RUN_TOOL, TOOL_ROUTER};

/// Query patterns per tool. Priority for single-tool selection follows this
/// order.
static TOOL_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("calculator", r"\d+(\.\d+)?\s*[-+*/×÷]\s*\d+"),
        ("calculator", r"(?i)\b(calculate|compute|sum of|how much is)\b"),
        (
            "calendar",
            r"(?i)\b(today'?s?\s+date|what\s+(day|date)\s+is|current\s+(date|time)|what\s+time\s+is)\b",
        ),
        (
            "weather",
            r"(?i)\b(weather|temperature|forecast|raining|sunny|humidity)\b",
        ),
        (
            "web_search",
            r"(?i)\b(search\s+(the\s+)?web|look\s+up\s+online|latest\s+news|google)\b",
        ),
    ]
    .into_iter()
    .filter_map(|(tool, pattern)| Regex::new(pattern).ok().map(|r| (tool, r)))
    .collect()
});

static ARITHMETIC: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[-(]?\s*\d[\d\s().+\-*/×÷]*[\d)]|\d").ok());

static LOCATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:in|for|at)\s+([A-Za-z][A-Za-z .'-]{1,40})").ok());

/// Tools whose patterns match the query, as a deterministic set.
pub fn detect_tools(query: &str) -> BTreeSet<String> {
    TOOL_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(query))
        .map(|(tool, _)| tool.to_string())
        .collect()
}

/// Chooses exactly one tool from the detected set (pattern-table priority
/// order) and extracts its parameters from the query. Any ambiguity —
/// no tool, or no extractable parameters for a tool that needs them —
/// leaves `tool_to_run` unset and the run proceeds straight to answer.
pub struct ToolRouterNode;

impl ToolRouterNode {
    fn extract_parameters(tool: &str, query: &str) -> Option<Value> {
        match tool {
            "calculator" => {
                let regex = ARITHMETIC.as_ref()?;
                let matched = regex
                    .find_iter(query)
                    .max_by_key(|m| m.as_str().len())?
                    .as_str()
                    .trim()
                    .trim_end_matches(['+', '-', '*', '/', ' ', '×', '÷'])
                    .to_string();
                if matched.is_empty() {
                    return None;
                }
                Some(json!({ "expression": matched }))
            }
            "calendar" => Some(json!({ "query": query })),
            "weather" => {
                let regex = LOCATION.as_ref()?;
                let location = regex.captures(query)?.get(1)?.as_str().trim().to_string();
                Some(json!({ "location": location }))
            }
            "web_search" => Some(json!({ "query": query })),
            _ => None,
        }
    }
}

#[async_trait]
impl Node<AgentState> for ToolRouterNode {
    fn id(&self) -> &str {
        TOOL_ROUTER
    }

    async fn run(
        &self,
        mut state: AgentState,
        _ctx: &RunContext,
    ) -> Result<(AgentState, Next), TrellisError> {
        let query = state.active_query().to_string();
        state.tasks.required_tools = detect_tools(&query);

        // Pattern-table order doubles as priority.
        let chosen = TOOL_PATTERNS
            .iter()
            .map(|(tool, _)| *tool)
            .find(|tool| state.tasks.required_tools.contains(*tool));

        state.tasks.tool_to_run = None;
        state.tasks.tool_parameters = None;
        if let Some(tool) = chosen {
            match Self::extract_parameters(tool, &query) {
                Some(parameters) => {
                    debug!(tool, ?parameters, "routed to tool");
                    state.tasks.tool_to_run = Some(tool.to_string());
                    state.tasks.tool_parameters = Some(parameters);
                }
                None => {
                    debug!(tool, "parameters ambiguous, skipping to answer");
                }
            }
        }

        Ok((state, Next::Continue))
    }
}

/// Execution policy for run_tool.
#[derive(Debug, Clone)]
pub struct ToolRunConfig {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for ToolRunConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(1),
        }
    }
}

/// Resolves the routed tool, validates input, executes with timeout and
/// exponential-backoff retries, and always appends a [`ToolResult`] — the
/// per-tool fallback covers persistent failures. Never fatal.
pub struct RunToolNode {
    registry: Arc<ToolRegistry>,
    config: ToolRunConfig,
}

impl RunToolNode {
    pub fn new(registry: Arc<ToolRegistry>, config: ToolRunConfig) -> Self {
        Self { registry, config }
    }

    async fn execute_with_retries(
        &self,
        tool: &dyn crate::tools::Tool,
        params: &Value,
    ) -> Result<String, TrellisError> {
        let max_attempts = 1 + self.config.retries;
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match timeout(self.config.timeout, tool.execute(params)).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(e)) => {
                    warn!(tool = tool.name(), attempt, "tool execution failed: {}", e);
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(tool = tool.name(), attempt, "tool execution timed out");
                    last_error = Some(TrellisError::Timeout(format!(
                        "{} exceeded {:?}",
                        tool.name(),
                        self.config.timeout
                    )));
                }
            }
            if attempt < max_attempts {
                let backoff = self
                    .config
                    .backoff_base
                    .saturating_mul(2u32.saturating_pow(attempt - 1))
                    .min(self.config.backoff_cap);
                sleep(backoff).await;
            }
        }
        Err(last_error.unwrap_or_else(|| TrellisError::Tool("tool retries exhausted".into())))
    }
}

#[async_trait]
impl Node<AgentState> for RunToolNode {
    fn id(&self) -> &str {
        RUN_TOOL
    }

    async fn run(
        &self,
        mut state: AgentState,
        _ctx: &RunContext,
    ) -> Result<(AgentState, Next), TrellisError> {
        let Some(name) = state.tasks.tool_to_run.clone() else {
            return Ok((state, Next::Continue));
        };
        let params = state
            .tasks
            .tool_parameters
            .clone()
            .unwrap_or_else(|| json!({}));
        let started = Instant::now();

        let result = match self.registry.get_tool(&name) {
            None => {
                state.record_error(RUN_TOOL, format!("unknown tool: {}", name));
                ToolResult {
                    tool_name: name.clone(),
                    input: params,
                    output: None,
                    error: Some(format!("unknown tool: {}", name)),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                }
            }
            Some(tool) => {
                let outcome = match self.registry.validate_tool_input(&name, &params) {
                    // Validation failures are permanent; go straight to fallback.
                    Err(e) => Err(e),
                    Ok(()) => self.execute_with_retries(tool.as_ref(), &params).await,
                };
                match outcome {
                    Ok(output) => ToolResult {
                        tool_name: name.clone(),
                        input: params,
                        output: Some(output),
                        error: None,
                        execution_time_ms: started.elapsed().as_millis() as u64,
                    },
                    Err(e) => {
                        state.record_error(RUN_TOOL, format!("{} failed: {}", name, e));
                        let fallback = tool.fallback(&params, &e);
                        ToolResult {
                            tool_name: name.clone(),
                            input: params,
                            output: Some(fallback),
                            error: Some(e.to_string()),
                            execution_time_ms: started.elapsed().as_millis() as u64,
                        }
                    }
                }
            }
        };

        state.tasks.tool_results.push(result);
        Ok((state, Next::Continue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::state::ChatOptions;

    fn state_with_tool(tool: Option<&str>, params: Option<Value>) -> AgentState {
        let mut state = AgentState::new(
            "r1",
            "u1",
            vec![Message::user("q")],
            ChatOptions::default(),
        );
        state.tasks.tool_to_run = tool.map(String::from);
        state.tasks.tool_parameters = params;
        state
    }

    fn fast_config() -> ToolRunConfig {
        ToolRunConfig {
            timeout: Duration::from_millis(500),
            retries: 2,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(4),
        }
    }

    /// **Scenario**: Pattern detection maps queries to the right tools.
    #[test]
    fn detects_tools_from_query() {
        assert!(detect_tools("what is 2 + 2").contains("calculator"));
        assert!(detect_tools("what's the weather in Berlin").contains("weather"));
        assert!(detect_tools("what day is it today's date").contains("calendar"));
        assert!(detect_tools("search the web for rust news").contains("web_search"));
        assert!(detect_tools("tell me about Delaware").is_empty());
    }

    /// **Scenario**: The router picks exactly one tool and extracts parameters.
    #[tokio::test]
    async fn routes_calculator_with_expression() {
        let ctx = RunContext::new("r1", "t1");
        let mut s = state_with_tool(None, None);
        s.tasks.original_query = "calculate 12 * (3 + 4) for me".into();
        let (state, _) = ToolRouterNode.run(s, &ctx).await.unwrap();
        assert_eq!(state.tasks.tool_to_run.as_deref(), Some("calculator"));
        let expression = state.tasks.tool_parameters.unwrap()["expression"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(expression.contains("12"));
        assert!(expression.contains('('));
    }

    /// **Scenario**: Ambiguous parameters skip the tool (straight to answer).
    #[tokio::test]
    async fn ambiguous_parameters_skip_tool() {
        let ctx = RunContext::new("r1", "t1");
        let mut s = state_with_tool(None, None);
        // Weather pattern matches but no "in/for/at <place>" to extract.
        s.tasks.original_query = "weather?".into();
        let (state, _) = ToolRouterNode.run(s, &ctx).await.unwrap();
        assert!(state.tasks.tool_to_run.is_none());
        assert!(state.tasks.required_tools.contains("weather"));
    }

    /// **Scenario**: Successful execution appends a clean ToolResult.
    #[tokio::test]
    async fn run_tool_success() {
        let node = RunToolNode::new(
            Arc::new(ToolRegistry::with_builtin_tools()),
            fast_config(),
        );
        let ctx = RunContext::new("r1", "t1");
        let s = state_with_tool(Some("calculator"), Some(json!({"expression": "6 * 7"})));
        let (state, _) = node.run(s, &ctx).await.unwrap();
        assert_eq!(state.tasks.tool_results.len(), 1);
        let result = &state.tasks.tool_results[0];
        assert_eq!(result.output.as_deref(), Some("6 * 7 = 42"));
        assert!(result.error.is_none());
    }

    /// **Scenario**: A persistently failing tool lands on its fallback with
    /// error set; the node never fails.
    #[tokio::test]
    async fn run_tool_failure_uses_fallback() {
        let node = RunToolNode::new(
            Arc::new(ToolRegistry::with_builtin_tools()),
            fast_config(),
        );
        let ctx = RunContext::new("r1", "t1");
        let s = state_with_tool(Some("weather"), Some(json!({"location": "Berlin"})));
        let (state, _) = node.run(s, &ctx).await.unwrap();
        let result = &state.tasks.tool_results[0];
        assert!(result.error.is_some());
        assert!(result.output.as_deref().unwrap_or("").contains("Berlin"));
        assert!(!state.metadata.errors.is_empty());
    }

    /// **Scenario**: An unknown routed tool records an errored result.
    #[tokio::test]
    async fn run_tool_unknown_tool() {
        let node = RunToolNode::new(
            Arc::new(ToolRegistry::with_builtin_tools()),
            fast_config(),
        );
        let ctx = RunContext::new("r1", "t1");
        let s = state_with_tool(Some("ghost"), Some(json!({})));
        let (state, _) = node.run(s, &ctx).await.unwrap();
        let result = &state.tasks.tool_results[0];
        assert!(result.output.is_none());
        assert!(result.error.as_deref().unwrap_or("").contains("unknown tool"));
    }

    /// **Scenario**: Invalid input goes straight to the fallback without retries.
    #[tokio::test]
    async fn run_tool_invalid_input() {
        let node = RunToolNode::new(
            Arc::new(ToolRegistry::with_builtin_tools()),
            fast_config(),
        );
        let ctx = RunContext::new("r1", "t1");
        let s = state_with_tool(Some("calculator"), Some(json!({})));
        let (state, _) = node.run(s, &ctx).await.unwrap();
        let result = &state.tasks.tool_results[0];
        assert!(result.error.as_deref().unwrap_or("").contains("missing required field"));
        assert!(result.output.is_some(), "fallback output still present");
    }
}
