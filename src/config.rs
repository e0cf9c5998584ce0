//! Configuration loader and validator for the Notion→Telegram relay.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Notion caps `page_size` at 100.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    pub telegram: Telegram,
    pub notion: Notion,
}

/// Polling and process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub poll_interval_secs: u64,
    pub first_poll_delay_secs: u64,
    pub max_items_per_check: u32,
    pub lookback_days: i64,
    pub log_level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            first_poll_delay_secs: 10,
            max_items_per_check: 5,
            lookback_days: 7,
            log_level: "info".into(),
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    /// Broadcast target for scheduled polls.
    pub chat_id: i64,
}

/// Notion API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notion {
    pub token: String,
    #[serde(default = "default_notion_version")]
    pub version: String,
    pub database_id: String,
    #[serde(default)]
    pub fields: Fields,
}

/// Property names in the remote database. These must match the remote
/// schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Fields {
    pub status: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub author: String,
}

impl Default for Fields {
    fn default() -> Self {
        Self {
            status: "Status".into(),
            title: "Creation Title".into(),
            kind: "Type".into(),
            content: "Content".into(),
            author: "Author".into(),
        }
    }
}

fn default_notion_version() -> String {
    "2022-06-28".into()
}

impl Config {
    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = lookup("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("TELEGRAM_CHAT_ID must be an integer"))?;
        }
        if let Some(v) = lookup("NOTION_TOKEN") {
            self.notion.token = v;
        }
        if let Some(v) = lookup("NOTION_DATABASE_ID") {
            self.notion.database_id = v;
        }
        if let Some(v) = lookup("CHECK_INTERVAL") {
            self.app.poll_interval_secs = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("CHECK_INTERVAL must be a number of seconds"))?;
        }
        if let Some(v) = lookup("MAX_ITEMS_PER_CHECK") {
            self.app.max_items_per_check = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("MAX_ITEMS_PER_CHECK must be an integer"))?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.app.log_level = v.to_ascii_lowercase();
        }
        Ok(())
    }
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with(path, |key| std::env::var(key).ok())
}

/// Like [`load`], with overrides read through `lookup` instead of the process
/// environment.
pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_overrides(lookup)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }
    if cfg.app.max_items_per_check == 0 || cfg.app.max_items_per_check > MAX_PAGE_SIZE {
        return Err(ConfigError::Invalid("app.max_items_per_check must be within 1..=100"));
    }
    if cfg.app.lookback_days < 0 {
        return Err(ConfigError::Invalid("app.lookback_days must be >= 0"));
    }
    if cfg.app.log_level.trim().is_empty() {
        return Err(ConfigError::Invalid("app.log_level must be non-empty"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.telegram.chat_id == 0 {
        return Err(ConfigError::Invalid("telegram.chat_id must be set"));
    }

    if cfg.notion.token.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.token must be non-empty"));
    }
    if cfg.notion.version.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.version must be non-empty"));
    }
    if cfg.notion.database_id.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.database_id must be non-empty"));
    }

    let f = &cfg.notion.fields;
    if f.status.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.fields.status must be non-empty"));
    }
    if f.title.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.fields.title must be non-empty"));
    }
    if f.kind.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.fields.type must be non-empty"));
    }
    if f.content.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.fields.content must be non-empty"));
    }
    if f.author.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.fields.author must be non-empty"));
    }

    Ok(())
}

/// Returns a complete example configuration.
pub fn example() -> &'static str {
    r#"app:
  poll_interval_secs: 300
  first_poll_delay_secs: 10
  max_items_per_check: 5
  lookback_days: 7
  log_level: "info"

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  chat_id: -1001234567890

notion:
  token: "YOUR_NOTION_INTEGRATION_TOKEN"
  version: "2022-06-28"
  database_id: "NOTION_DATABASE_ID"
  fields:
    status: "Status"
    title: "Creation Title"
    type: "Type"
    content: "Content"
    author: "Author"
"#
}
