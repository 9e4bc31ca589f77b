//! Configuration loading and resolution.
//!
//! Each setting is taken from the first source that has it: command line,
//! environment, JSON config file, built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use shinhai_gas::scheduler::DEFAULT_SCAN_INTERVAL;
use shinhai_gas::throttle::MIN_TIME_BETWEEN_FORCED_UPDATES;
use shinhai_gas::{AccountId, SchedulerConfig, BASE_URL, REQUEST_TIMEOUT};

use crate::error::{AgentError, AgentResult};

pub const ENV_ACCOUNT: &str = "SHINHAI_GAS_ACCOUNT";
pub const ENV_ENDPOINT: &str = "SHINHAI_GAS_ENDPOINT";
pub const ENV_SCAN_SECS: &str = "SHINHAI_GAS_SCAN_SECS";
pub const ENV_CONFIG: &str = "SHINHAI_GAS_CONFIG";

const CONFIG_DIR: &str = ".shinhai-gas";
const CONFIG_FILE: &str = "config.json";

/// On-disk config file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub account: Option<String>,
    pub endpoint: Option<String>,
    pub scan_interval_secs: Option<u64>,
    pub recovery_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub account: Option<String>,
    pub endpoint: Option<String>,
    pub config: Option<PathBuf>,
    pub scan_interval_secs: Option<u64>,
}

/// Fully resolved agent settings.
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    pub account: AccountId,
    pub endpoint: String,
    pub scan_interval_secs: u64,
    pub recovery_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub config_file: Option<PathBuf>,
}

impl AgentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            recovery_interval: Duration::from_secs(self.recovery_interval_secs),
            force_on_start: true,
        }
    }
}

/// Resolve the config file path.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(env_path) = env(ENV_CONFIG) {
        return Some(PathBuf::from(env_path));
    }

    let cwd_config = Path::new(CONFIG_DIR).join(CONFIG_FILE);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    let home = env("HOME").or_else(|| env("USERPROFILE"))?;
    let home_config = Path::new(&home).join(CONFIG_DIR).join(CONFIG_FILE);
    home_config.exists().then_some(home_config)
}

/// Read and parse a config file.
pub fn load_file_config(path: &Path) -> AgentResult<FileConfig> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Resolve settings from the process environment.
pub fn resolve(overrides: Overrides) -> AgentResult<AgentConfig> {
    resolve_with(overrides, |key| std::env::var(key).ok())
}

/// Resolve settings with an explicit environment lookup.
pub fn resolve_with(
    overrides: Overrides,
    env: impl Fn(&str) -> Option<String>,
) -> AgentResult<AgentConfig> {
    let config_file = resolve_config_path(overrides.config.as_deref(), &env);
    let file = match &config_file {
        Some(path) => match load_file_config(path) {
            Ok(file) => {
                tracing::debug!("Loaded config from {}", path.display());
                file
            }
            Err(e) => {
                tracing::warn!("Ignoring config file {}: {e}", path.display());
                FileConfig::default()
            }
        },
        None => FileConfig::default(),
    };

    let account = overrides
        .account
        .or_else(|| env(ENV_ACCOUNT))
        .or(file.account)
        .ok_or(AgentError::MissingAccount)?;
    let account = AccountId::new(account)?;

    let endpoint = overrides
        .endpoint
        .or_else(|| env(ENV_ENDPOINT))
        .or(file.endpoint)
        .unwrap_or_else(|| BASE_URL.to_string());

    let env_scan = env(ENV_SCAN_SECS).and_then(|raw| parse_secs(ENV_SCAN_SECS, &raw));
    let scan_interval_secs = positive(overrides.scan_interval_secs, "--scan-secs")
        .or_else(|| positive(env_scan, ENV_SCAN_SECS))
        .or_else(|| positive(file.scan_interval_secs, "scan_interval_secs"))
        .unwrap_or(DEFAULT_SCAN_INTERVAL.as_secs());

    let recovery_interval_secs = positive(file.recovery_interval_secs, "recovery_interval_secs")
        .unwrap_or(MIN_TIME_BETWEEN_FORCED_UPDATES.as_secs());

    let request_timeout_secs = positive(file.request_timeout_secs, "request_timeout_secs")
        .unwrap_or(REQUEST_TIMEOUT.as_secs());

    Ok(AgentConfig {
        account,
        endpoint,
        scan_interval_secs,
        recovery_interval_secs,
        request_timeout_secs,
        config_file,
    })
}

fn parse_secs(key: &str, raw: &str) -> Option<u64> {
    match raw.trim().parse() {
        Ok(secs) => Some(secs),
        Err(_) => {
            tracing::warn!("Ignoring {key}={raw:?}: not a whole number of seconds");
            None
        }
    }
}

/// Intervals of zero are rejected; the next source applies.
fn positive(value: Option<u64>, source: &str) -> Option<u64> {
    match value {
        Some(0) => {
            tracing::warn!("Ignoring zero interval from {source}");
            None
        }
        other => other,
    }
}
