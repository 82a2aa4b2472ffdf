// Environment-driven configuration for the routing client and the map surface.

use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_BASE_URL: &str = "https://api.openrouteservice.org";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);
/// Delay before the second layout invalidation after a page load.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
    #[error("cannot locate a map directory: neither TOURPLANNER_MAP_DIR nor HOME is set")]
    NoMapDir,
}

/// Immutable settings of the routing client.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl RouterConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key: api_key.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Reads `ORS_BASE_URL`, `ORS_API_KEY` and `ORS_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("ORS_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingVar("ORS_API_KEY"))?;
        let base_url = lookup("ORS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut config = Self::new(base_url, api_key);
        if let Some(secs) = lookup("ORS_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(parse_number("ORS_TIMEOUT_SECS", &secs)?);
        }
        Ok(config)
    }
}

/// Where the map page lives and how long report snapshots may wait.
#[derive(Debug, Clone)]
pub struct MapConfig {
    pub map_dir: PathBuf,
    pub snapshot_timeout: Duration,
    pub settle_delay: Duration,
}

impl MapConfig {
    pub fn new(map_dir: impl Into<PathBuf>) -> Self {
        Self {
            map_dir: map_dir.into(),
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Reads `TOURPLANNER_MAP_DIR` (default `$HOME/.tourplanner/leaflet`) and
    /// `TOURPLANNER_SNAPSHOT_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let map_dir = match lookup("TOURPLANNER_MAP_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => lookup("HOME")
                .map(|home| PathBuf::from(home).join(".tourplanner").join("leaflet"))
                .ok_or(ConfigError::NoMapDir)?,
        };

        let mut config = Self::new(map_dir);
        if let Some(ms) = lookup("TOURPLANNER_SNAPSHOT_TIMEOUT_MS") {
            config.snapshot_timeout =
                Duration::from_millis(parse_number("TOURPLANNER_SNAPSHOT_TIMEOUT_MS", &ms)?);
        }
        Ok(config)
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}
