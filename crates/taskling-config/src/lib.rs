pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AgentSettings, AppConfig, CalendarConfig, DatabaseConfig, GatewayConfig, LlmProviderConfig,
};
