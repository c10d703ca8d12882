pub mod calendar;
pub mod dates;
pub mod gateway;
pub mod openai;
pub mod planner;
pub mod providers;
pub mod runtime;
pub mod session;
pub mod tools;

pub use calendar::{CalendarProvider, HttpCalendarProvider};
pub use gateway::{ModelGateway, ModelTurn, ToolRequest};
pub use openai::OpenAiProvider;
pub use planner::{LlmPlanner, Planner};
pub use providers::LlmProvider;
pub use runtime::{AgentRuntime, DEFAULT_SYSTEM_PROMPT, RuntimeSettings};
pub use session::SessionState;
pub use tools::{Tool, ToolContext, ToolOutput, ToolRegistry};
