use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono_tz::Tz;
use taskling_agent::calendar::{CalendarProvider, HttpCalendarProvider};
use taskling_agent::gateway::ModelGateway;
use taskling_agent::openai::OpenAiProvider;
use taskling_agent::planner::LlmPlanner;
use taskling_agent::providers::LlmProvider;
use taskling_agent::runtime::{AgentRuntime, DEFAULT_SYSTEM_PROMPT, RuntimeSettings};
use taskling_agent::tools::{
    AddTask, ClearTasks, CompleteTask, ListTasks, ScheduleReminder, ToolRegistry,
};
use taskling_config::AppConfig;
use taskling_db::{SessionStore, TaskStore};
use tokio::sync::Mutex;
use tracing::info;

/// Wire stores, provider, planner, and tools into a ready runtime.
pub fn build_runtime(config: &AppConfig) -> anyhow::Result<Arc<AgentRuntime>> {
    let api_key = config
        .llm
        .api_key
        .clone()
        .context("no API key configured; set llm.api_key or TASKLING_API_KEY")?;
    let provider: Arc<dyn LlmProvider> =
        Arc::new(OpenAiProvider::new(api_key, config.llm.base_url.clone()));

    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tasks = Arc::new(Mutex::new(TaskStore::open(db_path)?));
    let sessions = Arc::new(Mutex::new(SessionStore::open(db_path)?));

    let calendar: Option<Arc<dyn CalendarProvider>> = if config.calendar.enabled {
        let token = config
            .calendar
            .api_token
            .clone()
            .context("calendar.enabled is set but no API token configured")?;
        info!("calendar integration enabled");
        Some(Arc::new(HttpCalendarProvider::new(
            &config.calendar.base_url,
            &config.calendar.calendar_id,
            token,
        )))
    } else {
        None
    };

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(AddTask::new(tasks.clone())));
    registry.register(Arc::new(ListTasks::new(tasks.clone())));
    registry.register(Arc::new(CompleteTask::new(tasks.clone())));
    registry.register(Arc::new(ClearTasks::new(tasks.clone())));
    registry.register(Arc::new(ScheduleReminder::new(tasks.clone(), calendar)));

    let planner = Arc::new(LlmPlanner::new(
        provider.clone(),
        &config.llm.model,
        config.agent.max_plan_steps,
    ));
    let gateway = ModelGateway::new(provider, &config.llm.model);

    let timezone: Tz = config
        .agent
        .default_timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown timezone '{}'", config.agent.default_timezone))?;

    let settings = RuntimeSettings {
        turn_budget: config.agent.turn_budget,
        history_limit: config.agent.history_limit,
        system_prompt: config
            .agent
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        default_timezone: timezone,
    };

    Ok(Arc::new(AgentRuntime::new(
        gateway,
        planner,
        registry,
        sessions,
        settings,
    )))
}
