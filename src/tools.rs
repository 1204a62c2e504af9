//! Short-circuit tools
//!
//! A tool inspects the raw user text and may answer it directly, skipping the
//! model. Tools are consulted in registration order; the first non-empty
//! answer wins.

mod calculator;
mod current_time;
mod search;
mod specific_reply;
mod weather;

pub use calculator::CalculatorTool;
pub use current_time::CurrentTimeTool;
pub use search::SearchTool;
pub use specific_reply::SpecificReplyTool;
pub use weather::WeatherTool;

use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Failure inside a tool handler. The router recovers from these.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

/// A deterministic rule that may answer a user turn without the model
#[async_trait]
pub trait ToolDescriptor: Send + Sync {
    /// Stable tool name, used for enable/disable
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Cheap check on the trimmed user text
    fn matches(&self, text: &str) -> bool;

    /// Produce the reply. `Ok(None)` means the tool declines after all.
    async fn handle(&self, text: &str) -> Result<Option<String>, ToolError>;
}

/// Named tool sets selected by deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolProfile {
    #[default]
    Development,
    Production,
    Test,
}

impl ToolProfile {
    /// Tools enabled under this profile, in routing order
    pub fn enabled_tools(self) -> &'static [&'static str] {
        match self {
            ToolProfile::Development | ToolProfile::Production => &[
                "specific_reply",
                "weather",
                "current_time",
                "search",
                "calculator",
            ],
            ToolProfile::Test => &["calculator", "current_time"],
        }
    }
}

impl FromStr for ToolProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(ToolProfile::Development),
            "production" | "prod" => Ok(ToolProfile::Production),
            "test" => Ok(ToolProfile::Test),
            other => Err(format!("unknown environment profile: {other}")),
        }
    }
}

/// Enabled state of one registered tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

struct RegisteredTool {
    tool: Arc<dyn ToolDescriptor>,
    enabled: AtomicBool,
}

/// Ordered collection of short-circuit tools
#[derive(Default)]
pub struct ToolRouter {
    tools: Vec<RegisteredTool>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool at the end of the routing order
    #[must_use]
    pub fn with_tool(mut self, tool: impl ToolDescriptor + 'static, enabled: bool) -> Self {
        self.tools.push(RegisteredTool {
            tool: Arc::new(tool),
            enabled: AtomicBool::new(enabled),
        });
        self
    }

    /// Built-in tools for a profile. The profile's tools come first in its
    /// order; the remaining built-ins are registered disabled so they can be
    /// switched on at runtime.
    pub fn for_profile(profile: ToolProfile) -> Self {
        let mut builtins: Vec<Arc<dyn ToolDescriptor>> = vec![
            Arc::new(SpecificReplyTool::default()),
            Arc::new(WeatherTool),
            Arc::new(CurrentTimeTool),
            Arc::new(SearchTool),
            Arc::new(CalculatorTool),
        ];

        let mut tools = Vec::with_capacity(builtins.len());
        for name in profile.enabled_tools() {
            if let Some(pos) = builtins.iter().position(|t| t.name() == *name) {
                tools.push(RegisteredTool {
                    tool: builtins.remove(pos),
                    enabled: AtomicBool::new(true),
                });
            }
        }
        tools.extend(builtins.into_iter().map(|tool| RegisteredTool {
            tool,
            enabled: AtomicBool::new(false),
        }));

        Self { tools }
    }

    /// Answer `text` with the first enabled tool that produces a reply
    pub async fn try_short_circuit(&self, text: &str) -> Option<String> {
        let text = text.trim();
        for entry in &self.tools {
            if !entry.enabled.load(Ordering::Relaxed) || !entry.tool.matches(text) {
                continue;
            }
            match entry.tool.handle(text).await {
                Ok(Some(reply)) if !reply.is_empty() => {
                    tracing::debug!(tool = entry.tool.name(), "Tool short-circuited turn");
                    return Some(reply);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        tool = entry.tool.name(),
                        error = %e,
                        "Tool handler failed, continuing"
                    );
                }
            }
        }
        None
    }

    /// Enable or disable a tool by name. Returns false for unknown names.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let Some(entry) = self.tools.iter().find(|t| t.tool.name() == name) else {
            return false;
        };
        entry.enabled.store(enabled, Ordering::Relaxed);
        tracing::info!(tool = name, enabled, "Tool toggled");
        true
    }

    pub fn describe(&self) -> Vec<ToolStatus> {
        self.tools
            .iter()
            .map(|t| ToolStatus {
                name: t.tool.name().to_string(),
                description: t.tool.description().to_string(),
                enabled: t.enabled.load(Ordering::Relaxed),
            })
            .collect()
    }
}
