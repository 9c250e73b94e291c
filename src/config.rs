//! Agent configuration: timing knobs from a JSON file, identity and store wiring from the environment.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Default location on disk where the agent looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/agent.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ROUNDTABLE_AGENT_CONFIG_PATH";

const TABLE_ID_ENV: &str = "ROUNDTABLE_TABLE_ID";
const PARTICIPANT_ID_ENV: &str = "ROUNDTABLE_PARTICIPANT_ID";
const STORE_ENV: &str = "ROUNDTABLE_STORE";

/// Immutable timing and feature configuration shared across the agent.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Length of the suggest phase opened by a start or next-round request.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "suggest_duration_ms")]
    pub suggest_duration: Duration,
    /// Length of the vote phase opened when suggestions close.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "vote_duration_ms")]
    pub vote_duration: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "probe_interval_ms")]
    pub probe_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "probe_timeout_ms")]
    pub probe_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "watchdog_poll_ms")]
    pub watchdog_poll: Duration,
    /// Age of the cached view after which it is considered stale.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "stale_after_ms")]
    pub stale_after: Duration,
    /// Age of the cached view after which the watchdog panics.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "panic_after_ms")]
    pub panic_after: Duration,
    pub watchdog_enabled: bool,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "polling_interval_ms")]
    pub polling_interval: Duration,
    pub polling_enabled: bool,
    /// Whether a realtime push channel delivers updates; polling only runs without one.
    pub realtime_enabled: bool,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cleanup_interval_ms")]
    pub cleanup_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cleanup_min_spacing_ms")]
    pub cleanup_min_spacing: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cleanup_initial_delay_ms")]
    pub cleanup_initial_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "auto_advance_countdown_ms")]
    pub auto_advance_countdown: Duration,
    /// Auto-advance setting for tables that do not carry their own flag.
    pub auto_advance_default: bool,
    /// Upper bound on a single advance request.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "advance_timeout_ms")]
    pub advance_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            suggest_duration: Duration::from_secs(60),
            vote_duration: Duration::from_secs(45),
            probe_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            watchdog_poll: Duration::from_secs(2),
            stale_after: Duration::from_secs(20),
            panic_after: Duration::from_secs(45),
            watchdog_enabled: true,
            polling_interval: Duration::from_secs(5),
            polling_enabled: true,
            realtime_enabled: false,
            cleanup_interval: Duration::from_secs(5 * 60),
            cleanup_min_spacing: Duration::from_secs(30),
            cleanup_initial_delay: Duration::from_secs(15),
            auto_advance_countdown: Duration::from_secs(3),
            auto_advance_default: true,
            advance_timeout: Duration::from_secs(5),
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to the built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded agent config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; omitted keys keep their defaults.
    ///
    /// Timer periods must be non-zero; a zero period is replaced by its default.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        Ok(config.with_nonzero_periods())
    }

    fn with_nonzero_periods(mut self) -> Self {
        let defaults = Self::default();
        for (key, period, default) in [
            ("probe_interval_ms", &mut self.probe_interval, defaults.probe_interval),
            ("watchdog_poll_ms", &mut self.watchdog_poll, defaults.watchdog_poll),
            ("polling_interval_ms", &mut self.polling_interval, defaults.polling_interval),
            ("cleanup_interval_ms", &mut self.cleanup_interval, defaults.cleanup_interval),
        ] {
            if period.is_zero() {
                warn!(key, ?default, "timer period must be non-zero; using the default");
                *period = default;
            }
        }
        self
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Environment-level configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{var}` is not a valid UUID: {value}")]
    InvalidUuid { var: &'static str, value: String },
    #[error("environment variable `ROUNDTABLE_STORE` must be `rest` or `memory` (got `{0}`)")]
    UnknownStore(String),
}

/// Table this agent coordinates and the participant it acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentIdentity {
    pub table_id: Uuid,
    pub participant_id: Uuid,
}

impl AgentIdentity {
    /// Read the identity from the environment; missing values are generated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            table_id: uuid_from_env(TABLE_ID_ENV)?,
            participant_id: uuid_from_env(PARTICIPANT_ID_ENV)?,
        })
    }
}

fn uuid_from_env(var: &'static str) -> Result<Uuid, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => {
            Uuid::parse_str(value.trim()).map_err(|_| ConfigError::InvalidUuid { var, value })
        }
        _ => {
            let generated = Uuid::new_v4();
            warn!(var, %generated, "identity variable not set; generated a fresh id");
            Ok(generated)
        }
    }
}

/// Backend the agent talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// PostgREST-style HTTP store.
    Rest,
    /// In-process store seeded with a demo table.
    Memory,
}

impl StoreKind {
    /// Read [`STORE_ENV`]; defaults to the REST store when it is compiled in.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(STORE_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) if cfg!(feature = "rest-store") => Ok(StoreKind::Rest),
            Err(_) => Ok(StoreKind::Memory),
        }
    }

    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(StoreKind::Rest),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(ConfigError::UnknownStore(value.to_string())),
        }
    }
}
