//! Runtime settings
//!
//! Loaded from an optional `~/.taskforce/config.toml`, then overridden by
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::constants::{ai, interaction, workflow};
use crate::paths;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub workspace_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_turns: usize,
    /// Ask the model who speaks next instead of applying the fixed rule
    pub model_selection: bool,
    pub interaction: InteractionSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: paths::default_database_path(),
            workspace_dir: PathBuf::from("workspace"),
            host: "127.0.0.1".to_string(),
            port: 8000,
            openai_api_key: None,
            model: ai::DEFAULT_MODEL.to_string(),
            base_url: ai::DEFAULT_BASE_URL.to_string(),
            max_turns: workflow::DEFAULT_MAX_TURNS,
            model_selection: true,
            interaction: InteractionSettings::default(),
        }
    }
}

/// Broker wait limits, in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InteractionSettings {
    pub input_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub guidance_timeout_secs: u64,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            input_timeout_secs: interaction::INPUT_TIMEOUT.as_secs(),
            confirmation_timeout_secs: interaction::CONFIRMATION_TIMEOUT.as_secs(),
            guidance_timeout_secs: interaction::GUIDANCE_TIMEOUT.as_secs(),
        }
    }
}

impl InteractionSettings {
    pub fn input_timeout(&self) -> Duration {
        Duration::from_secs(self.input_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn guidance_timeout(&self) -> Duration {
        Duration::from_secs(self.guidance_timeout_secs)
    }
}

impl Settings {
    /// Load from the default config file (if any) and the process environment
    pub fn load() -> Result<Self> {
        let path = paths::config_file_path();
        let mut settings = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TASKFORCE_DB_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TASKFORCE_WORKSPACE_DIR") {
            self.workspace_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TASKFORCE_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.port = v
                .parse()
                .with_context(|| format!("Invalid PORT value: {v}"))?;
        }
        if let Some(v) = lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.openai_api_key = Some(v);
        }
        if let Some(v) = lookup("TASKFORCE_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("TASKFORCE_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("TASKFORCE_MAX_TURNS") {
            self.max_turns = v
                .parse()
                .with_context(|| format!("Invalid TASKFORCE_MAX_TURNS value: {v}"))?;
        }
        if let Some(v) = lookup("TASKFORCE_MODEL_SELECTION") {
            self.model_selection = !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
