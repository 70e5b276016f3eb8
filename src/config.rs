use crate::assistant::RemoteAssistant;
use crate::storage::default_data_dir;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_ENV: &str = "DAYBOOK_ASSISTANT_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
    pub assistant: AssistantConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Without an endpoint every message is answered by the local grammar.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: None,
            log_level: "info".into(),
            assistant: AssistantConfig::default(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        AssistantConfig {
            endpoint: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Reads the platform config file (if any) and applies environment
    /// overrides. An unusable file is reported and replaced by defaults.
    pub fn load() -> Self {
        let mut config = match default_config_path() {
            Ok(path) => Config::load_or_default(&path),
            Err(err) => {
                eprintln!("warning: {err:#}; using default settings");
                Config::default()
            }
        };
        config.apply_api_key(env::var(API_KEY_ENV).ok());
        config
    }

    /// Runs before logging starts, so problems go to stderr.
    pub fn load_or_default(path: &Path) -> Self {
        Config::load_from(path).unwrap_or_else(|err| {
            eprintln!("warning: {err:#}; using default settings");
            Config::default()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let data = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        serde_yaml::from_str(&data).with_context(|| format!("parsing config {:?}", path))
    }

    pub fn apply_api_key(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.assistant.api_key = Some(key);
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    pub fn remote_assistant(&self) -> Option<RemoteAssistant> {
        let endpoint = self.assistant.endpoint.as_deref()?.trim();
        if endpoint.is_empty() {
            return None;
        }
        Some(RemoteAssistant::new(
            endpoint,
            self.assistant.api_key.clone(),
            Duration::from_secs(self.assistant.timeout_secs.max(1)),
        ))
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "daybook").context("locating config directory")?;
    Ok(dirs.config_dir().join("config.yml"))
}
