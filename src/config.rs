use std::{fs, path::Path, path::PathBuf};

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

const DEFAULT_BUCKET: &str = "jetaa-events";
const DEFAULT_PREFIX: &str = "as-json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub bucket: String,
    pub prefix: String,
    /// Day of the week (UTC) on which the weekly digest is computed.
    pub weekly_day: Weekday,
    pub database_path: Option<PathBuf>,
    pub webhook_url: Option<String>,
    /// Calendar year scraped from the JETAA site; defaults to the current year.
    pub jetaa_year: Option<i32>,
    pub notify_run_summary: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            weekly_day: Weekday::Mon,
            database_path: None,
            webhook_url: None,
            jetaa_year: None,
            notify_run_summary: false,
        }
    }
}

impl AppConfig {
    /// Config file from the data directory, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = read_config(&utils::config_path())?;
        config.with_env(|name| std::env::var(name).ok())
    }

    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let var = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(bucket) = var("EVENT_WATCH_BUCKET") {
            self.bucket = bucket;
        }
        if let Some(prefix) = var("EVENT_WATCH_PREFIX") {
            self.prefix = prefix.trim_end_matches('/').to_string();
        }
        if let Some(day) = var("EVENT_WATCH_WEEKLY_DAY") {
            self.weekly_day = day.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "EVENT_WATCH_WEEKLY_DAY",
                value: day.clone(),
            })?;
        }
        if let Some(path) = var("EVENT_WATCH_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = var("GOOGLE_CHAT_WEBHOOK_URL") {
            self.webhook_url = Some(url);
        }
        if let Some(year) = var("EVENT_WATCH_JETAA_YEAR") {
            self.jetaa_year = Some(year.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "EVENT_WATCH_JETAA_YEAR",
                value: year.clone(),
            })?);
        }
        if let Some(flag) = var("EVENT_WATCH_RUN_SUMMARY") {
            self.notify_run_summary = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "EVENT_WATCH_RUN_SUMMARY",
                        value: flag,
                    })
                }
            };
        }

        Ok(self)
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let read_err = |reason: String| ConfigError::Read {
        path: path.to_path_buf(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|err| read_err(err.to_string()))?;
    serde_json::from_str(&contents).map_err(|err| read_err(err.to_string()))
}
