//! Builtin tools: calculator, calendar, weather, web_search.
//!
//! Calculator and calendar run locally. Weather and web search are fronts
//! for external services; without a backend wired in they fail over to their
//! canned fallbacks.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::TrellisError;

use super::Tool;

/// Arithmetic expression evaluator (+, -, *, /, parentheses).
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string", "description": "Arithmetic expression, e.g. \"2 * (3 + 4)\"" }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, params: &Value) -> Result<String, TrellisError> {
        let expression = params
            .get("expression")
            .and_then(|e| e.as_str())
            .ok_or_else(|| TrellisError::Validation("calculator needs an expression".into()))?;
        let value = eval_expression(expression).map_err(TrellisError::Tool)?;
        // Trim trailing zeros for whole numbers.
        if value.fract() == 0.0 && value.abs() < 1e15 {
            Ok(format!("{} = {}", expression.trim(), value as i64))
        } else {
            Ok(format!("{} = {}", expression.trim(), value))
        }
    }

    fn fallback(&self, params: &Value, _error: &TrellisError) -> String {
        let expression = params
            .get("expression")
            .and_then(|e| e.as_str())
            .unwrap_or("the expression");
        format!("I couldn't evaluate {}.", expression)
    }
}

/// Current date and time (UTC).
pub struct CalendarTool;

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "calendar"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Optional date question" }
            },
            "required": []
        })
    }

    async fn execute(&self, _params: &Value) -> Result<String, TrellisError> {
        let now = Utc::now();
        Ok(format!(
            "Today is {} (UTC). The current time is {}.",
            now.format("%A, %Y-%m-%d"),
            now.format("%H:%M")
        ))
    }

    fn fallback(&self, _params: &Value, _error: &TrellisError) -> String {
        "The current date is unavailable right now.".to_string()
    }
}

/// Front for an external weather service; no backend in this build.
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": { "type": "string", "description": "City or place name" }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, _params: &Value) -> Result<String, TrellisError> {
        Err(TrellisError::Tool("no weather backend configured".into()))
    }

    fn fallback(&self, params: &Value, _error: &TrellisError) -> String {
        let location = params
            .get("location")
            .and_then(|l| l.as_str())
            .unwrap_or("that location");
        format!(
            "Live weather is unavailable right now; please check a weather service for {}.",
            location
        )
    }
}

/// Front for an external search service; no backend in this build.
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, _params: &Value) -> Result<String, TrellisError> {
        Err(TrellisError::Tool("no search backend configured".into()))
    }

    fn fallback(&self, params: &Value, _error: &TrellisError) -> String {
        let query = params
            .get("query")
            .and_then(|q| q.as_str())
            .unwrap_or("that topic");
        format!("Web search is unavailable right now; I couldn't look up \"{}\".", query)
    }
}

/// Evaluates an arithmetic expression with +, -, *, /, unary minus, and
/// parentheses. `×` and `÷` are accepted as aliases.
fn eval_expression(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("empty expression".into());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("unexpected trailing input".into());
    }
    if !value.is_finite() {
        return Err("result is not finite".into());
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        number.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = number
                    .parse::<f64>()
                    .map_err(|_| format!("bad number: {}", number))?;
                tokens.push(Token::Number(value));
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' | '×' => {
                tokens.push(Token::Star);
                chars.next();
            }
            '/' | '÷' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            other => return Err(format!("unexpected character: {}", other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut value = self.parse_term()?;
        while let Some(token) = self.tokens.get(self.pos).cloned() {
            match token {
                Token::Plus => {
                    self.pos += 1;
                    value += self.parse_term()?;
                }
                Token::Minus => {
                    self.pos += 1;
                    value -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<f64, String> {
        let mut value = self.parse_factor()?;
        while let Some(token) = self.tokens.get(self.pos).cloned() {
            match token {
                Token::Star => {
                    self.pos += 1;
                    value *= self.parse_factor()?;
                }
                Token::Slash => {
                    self.pos += 1;
                    let divisor = self.parse_factor()?;
                    if divisor == 0.0 {
                        return Err("division by zero".into());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_factor(&mut self) -> Result<f64, String> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.parse_factor()?)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.parse_expr()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err("missing closing parenthesis".into()),
                }
            }
            other => Err(format!("unexpected token: {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Arithmetic with precedence, parens, and unary minus.
    #[test]
    fn calculator_evaluates() {
        assert_eq!(eval_expression("1 + 2 * 3").unwrap(), 7.0);
        assert_eq!(eval_expression("(1 + 2) * 3").unwrap(), 9.0);
        assert_eq!(eval_expression("-4 + 10").unwrap(), 6.0);
        assert_eq!(eval_expression("10 ÷ 4").unwrap(), 2.5);
        assert_eq!(eval_expression("2 × 8").unwrap(), 16.0);
    }

    /// **Scenario**: Bad expressions error instead of panicking.
    #[test]
    fn calculator_rejects_bad_input() {
        assert!(eval_expression("").is_err());
        assert!(eval_expression("1 +").is_err());
        assert!(eval_expression("(1 + 2").is_err());
        assert!(eval_expression("1 / 0").is_err());
        assert!(eval_expression("two plus two").is_err());
    }

    /// **Scenario**: Tool execute formats the result.
    #[tokio::test]
    async fn calculator_tool_output() {
        let output = CalculatorTool
            .execute(&serde_json::json!({"expression": "6 * 7"}))
            .await
            .unwrap();
        assert_eq!(output, "6 * 7 = 42");
    }

    /// **Scenario**: Calendar reports a date; weather and search fall back.
    #[tokio::test]
    async fn calendar_and_stub_tools() {
        let output = CalendarTool.execute(&serde_json::json!({})).await.unwrap();
        assert!(output.contains("Today is"));

        let err = WeatherTool
            .execute(&serde_json::json!({"location": "Berlin"}))
            .await
            .unwrap_err();
        let fallback = WeatherTool.fallback(&serde_json::json!({"location": "Berlin"}), &err);
        assert!(fallback.contains("Berlin"));

        let err = WebSearchTool
            .execute(&serde_json::json!({"query": "rust"}))
            .await
            .unwrap_err();
        let fallback = WebSearchTool.fallback(&serde_json::json!({"query": "rust"}), &err);
        assert!(fallback.contains("rust"));
    }
}
