use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::ports::repositories::FeatureFlags;

pub const DATA_DIR_VAR: &str = "COMMIT_HOOKS_DATA_DIR";
pub const DATABASE_URL_VAR: &str = "COMMIT_HOOKS_DATABASE_URL";
pub const CHECK_INTERVAL_VAR: &str = "COMMIT_HOOKS_CHECK_INTERVAL_SECS";
pub const WATCH_DEBOUNCE_VAR: &str = "COMMIT_HOOKS_WATCH_DEBOUNCE_MS";
pub const LOG_DIR_VAR: &str = "COMMIT_HOOKS_LOG_DIR";
pub const LOG_JSON_VAR: &str = "COMMIT_HOOKS_LOG_JSON";
pub const REMOVE_ORPHAN_HOOKS_VAR: &str = "COMMIT_HOOKS_REMOVE_ORPHAN_HOOKS";

const DEFAULT_DATA_DIR: &str = "/data/easycicd";
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 300;

/// Agent configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub database_url: String,
    pub check_interval: Duration,
    /// Quiet period after a webhooks file event before reloading
    pub watch_debounce: Duration,
    /// Also write daily-rotated log files here
    pub log_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl AgentConfig {
    /// Load config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(lookup(DATA_DIR_VAR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let database_url = lookup(DATABASE_URL_VAR)
            .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("db.sqlite").display()));

        let check_interval = Duration::from_secs(parse_positive(&lookup, CHECK_INTERVAL_VAR, DEFAULT_CHECK_INTERVAL_SECS)?);
        let watch_debounce = Duration::from_millis(parse_positive(&lookup, WATCH_DEBOUNCE_VAR, DEFAULT_WATCH_DEBOUNCE_MS)?);

        Ok(Self {
            data_dir,
            database_url,
            check_interval,
            watch_debounce,
            log_dir: lookup(LOG_DIR_VAR).filter(|s| !s.is_empty()).map(PathBuf::from),
            log_json: lookup(LOG_JSON_VAR).map(|v| parse_bool(&v)).unwrap_or(false),
        })
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> Result<u64> {
    let value = match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a positive number, got '{}'", name, raw))?,
        None => default,
    };

    if value == 0 {
        anyhow::bail!("{} must be greater than zero", name);
    }

    Ok(value)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Feature flags read from the environment on every call, so they can be
/// flipped without a restart
#[derive(Debug, Clone, Default)]
pub struct EnvFeatureFlags;

impl FeatureFlags for EnvFeatureFlags {
    fn is_orphan_removal_enabled(&self) -> bool {
        env::var(REMOVE_ORPHAN_HOOKS_VAR)
            .map(|v| parse_bool(&v))
            .unwrap_or(false)
    }
}

#[cfg(test)]
impl AgentConfig {
    /// In-memory database and short timings, data under `data_dir`
    pub(crate) fn for_tests(data_dir: &std::path::Path, check_interval: Duration) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            database_url: "sqlite::memory:".to_string(),
            check_interval,
            watch_debounce: Duration::from_millis(50),
            log_dir: None,
            log_json: false,
        }
    }
}
