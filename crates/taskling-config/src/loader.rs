use std::path::{Path, PathBuf};

use taskling_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Loads `taskling.toml`, applying environment overrides for secrets so
/// API keys never have to live in the config file.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default config location: `~/.taskling/config.toml`.
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".taskling").join("config.toml")
    }

    /// Load from an explicit path, or from the default location. A missing
    /// file is not an error: defaults apply and env vars can still supply
    /// the secrets.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            let config: AppConfig = toml::from_str(&raw).map_err(|e| {
                Error::Config(format!("failed to parse {}: {e}", path.display()))
            })?;
            info!("loaded config from {}", path.display());
            config
        } else {
            debug!("no config file at {}, using defaults", path.display());
            AppConfig::default()
        };

        Self::apply_env_overrides(&mut config);
        config.database.path = expand_home(&config.database.path);
        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(key) = std::env::var("TASKLING_API_KEY")
            && !key.is_empty()
        {
            config.llm.api_key = Some(key);
        }
        if let Ok(token) = std::env::var("TASKLING_CALENDAR_TOKEN")
            && !token.is_empty()
        {
            config.calendar.api_token = Some(token);
        }
        if let Ok(model) = std::env::var("TASKLING_MODEL")
            && !model.is_empty()
        {
            config.llm.model = model;
        }
    }
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest).to_string_lossy().into_owned();
    }
    path.to_string()
}
