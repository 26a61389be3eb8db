use serde::Deserialize;
use std::fs;
use std::env;
use anyhow::{Context, Result};

use crate::error::EngineError;
use crate::quota::RolloverPolicy;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// JSON file backing the key-value store. Empty keeps everything in memory.
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_rollover_poll_secs")]
    pub rollover_poll_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct QuotaConfig {
    #[serde(default)]
    pub policy: RolloverPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WidgetConfig {
    #[serde(default = "default_agent_id")]
    pub default_agent_id: String,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Es,
    En,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_rollover_poll_secs() -> u64 {
    60
}

fn default_agent_id() -> String {
    "agent_5801k980pd6de588yakw4v87wbtf".to_string()
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            rollover_poll_secs: default_rollover_poll_secs(),
        }
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            default_agent_id: default_agent_id(),
            locale: Locale::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.timer.tick_interval_ms == 0 {
            return Err(EngineError::Config("timer.tick_interval_ms must be positive".into()));
        }
        if self.timer.rollover_poll_secs == 0 {
            return Err(EngineError::Config("timer.rollover_poll_secs must be positive".into()));
        }
        if self.widget.default_agent_id.trim().is_empty() {
            return Err(EngineError::Config("widget.default_agent_id must not be empty".into()));
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    let config_content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path))?;

    parse_config(&config_content)
}
