use serde::{Deserialize, Serialize};

/// Top-level application configuration, deserialized from `taskling.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmProviderConfig,
    pub database: DatabaseConfig,
    pub agent: AgentSettings,
    pub calendar: CalendarConfig,
    pub gateway: GatewayConfig,
}

/// OpenAI-compatible chat-completions endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. `~` is expanded by the loader.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.taskling/taskling.db".to_string(),
        }
    }
}

/// Knobs for the execution loop and planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Hard cap on model calls per user message.
    pub turn_budget: usize,
    /// Upper bound on planner output length.
    pub max_plan_steps: usize,
    /// Persisted history is trimmed to this many trailing messages.
    pub history_limit: usize,
    /// IANA timezone used when the user does not state one.
    pub default_timezone: String,
    /// Overrides the built-in assistant persona when set.
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            turn_budget: 10,
            max_plan_steps: 5,
            history_limit: 50,
            default_timezone: "UTC".to_string(),
            system_prompt: None,
        }
    }
}

/// External calendar collaborator. Disabled by default; reminders still
/// work without it, they just skip the calendar event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub enabled: bool,
    pub base_url: String,
    pub calendar_id: String,
    pub api_token: Option<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            calendar_id: "primary".to_string(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.agent.turn_budget, 10);
        assert_eq!(config.agent.max_plan_steps, 5);
        assert_eq!(config.agent.default_timezone, "UTC");
        assert!(!config.calendar.enabled);
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [llm]
            model = "gpt-4o"

            [agent]
            turn_budget = 4
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.agent.turn_budget, 4);
        assert_eq!(config.agent.history_limit, 50);
    }
}
