use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GbqError, Result};

pub const PROJECT_ENV: &str = "BIGQUERY_PROJECT";
pub const KEY_PATH_ENV: &str = "BIGQUERY_KEY_PATH";
pub const LOCATION_ENV: &str = "BIGQUERY_LOCATION";

const CONFIG_DIR: &str = "bqframe";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub project_id: Option<String>,
    /// Service-account key file; application default credentials when absent.
    pub key_path: Option<PathBuf>,
    pub location: Option<String>,
    pub verbose: bool,
    pub strict: bool,
    pub poll_interval_ms: u64,
    pub progress_threshold_secs: f64,
    pub chunk_size: usize,
    pub consistency_delay_secs: u64,
    pub schema_change_delay_secs: u64,
    pub cancel_on_timeout: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_id: None,
            key_path: None,
            location: None,
            verbose: false,
            strict: true,
            poll_interval_ms: 1000,
            progress_threshold_secs: 7.0,
            chunk_size: 10_000,
            consistency_delay_secs: 30,
            schema_change_delay_secs: 120,
            cancel_on_timeout: false,
        }
    }
}

impl Settings {
    /// Defaults, then the YAML file (explicit path or the per-user config
    /// file when it exists), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(project) = lookup(PROJECT_ENV).filter(|v| !v.is_empty()) {
            self.project_id = Some(project);
        }
        if let Some(key_path) = lookup(KEY_PATH_ENV).filter(|v| !v.is_empty()) {
            self.key_path = Some(PathBuf::from(key_path));
        }
        if let Some(location) = lookup(LOCATION_ENV).filter(|v| !v.is_empty()) {
            self.location = Some(location);
        }
    }

    pub fn require_project(&self) -> Result<&str> {
        self.project_id.as_deref().ok_or_else(|| {
            GbqError::Configuration(format!(
                "no project id configured; set {} or project_id in {}",
                PROJECT_ENV, CONFIG_FILE
            ))
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.progress_threshold_secs.max(0.0))
    }

    pub fn consistency_delay(&self) -> Duration {
        Duration::from_secs(self.consistency_delay_secs)
    }

    pub fn schema_change_delay(&self) -> Duration {
        Duration::from_secs(self.schema_change_delay_secs)
    }
}
