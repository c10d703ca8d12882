pub mod reminder;
pub mod tasks;

use async_trait::async_trait;
use chrono_tz::Tz;
use std::sync::Arc;
use taskling_common::Result;
use tracing::info;

use crate::providers::ToolDefinition;

pub use reminder::ScheduleReminder;
pub use tasks::{AddTask, ClearTasks, CompleteTask, ListTasks};

/// Per-turn context handed to every tool invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub user_id: String,
    pub timezone: Tz,
}

/// Result of a tool execution. Expected domain failures (bad arguments,
/// unknown task numbers) travel here as `is_error` text for the model to
/// react to; only infrastructure failures use `Err` on `execute`.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A named, schema-typed, side-effecting operation exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput>;
}

/// An explicit, passed-in set of tools. Built once at startup and threaded
/// through the runtime; nothing here is process-global.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        info!("registered tool: {}", tool.name());
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}
