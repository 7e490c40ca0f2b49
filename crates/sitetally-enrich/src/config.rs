//! Run configuration
//!
//! Loaded from a JSON file (every field optional), then overridden by
//! environment variables and finally by CLI flags:
//!
//! | variable              | field                    |
//! |-----------------------|--------------------------|
//! | `SITETALLY_ENDPOINT`  | `http.endpoint`          |
//! | `SITETALLY_COOKIE`    | `http.headers["cookie"]` |
//! | `SITETALLY_STATE_DIR` | `storage.state_dir`      |

use serde::{Deserialize, Serialize};
use sitetally_storage::StorageConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENV_ENDPOINT: &str = "SITETALLY_ENDPOINT";
pub const ENV_COOKIE: &str = "SITETALLY_COOKIE";
pub const ENV_STATE_DIR: &str = "SITETALLY_STATE_DIR";

/// Request URL template. `{key}`, `{from}` and `{to}` are substituted per call.
pub const DEFAULT_ENDPOINT: &str = "https://pro.similarweb.com/api/WebsiteOverview/getheader?mainDomainOnly=false&includeCrossData=true&key={key}&isWWW=false&country=999&to={to}&from={from}&isWindow=false&webSource=Total&ignoreFilterConsistency=false";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

/// Chunk sizes and inter-chunk pauses, both inclusive ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub chunk_min: usize,
    pub chunk_max: usize,
    pub pause_min_secs: u64,
    pub pause_max_secs: u64,
    /// Fixed RNG seed; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            chunk_min: 3,
            chunk_max: 7,
            pause_min_secs: 6,
            pause_max_secs: 20,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
    /// Field read from the first object of the response body.
    pub metric_field: String,
    /// `chrono` format for `{from}` / `{to}`.
    pub date_format: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let headers = [
            ("accept", "application/json"),
            ("cache-control", "no-cache"),
            ("content-type", "application/json; charset=utf-8"),
            ("x-requested-with", "XMLHttpRequest"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            headers,
            metric_field: "monthlyVisits".to_string(),
            date_format: "%Y|%m|%d".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Everything a run needs besides the catalog itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub pacing: PacingConfig,
    /// Fetch attempts per leaf and run. Only transient failures are retried.
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_backoff_secs`.
    pub retry_backoff_secs: u64,
    /// Length of the trailing full-month window.
    pub window_months: u32,
    pub http: HttpConfig,
    pub storage: StorageConfig,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            max_attempts: 1,
            retry_backoff_secs: 5,
            window_months: 3,
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EnrichConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `SITETALLY_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
            self.http.endpoint = endpoint;
        }
        if let Some(cookie) = non_empty(ENV_COOKIE) {
            self.http.headers.insert("cookie".to_string(), cookie);
        }
        if let Some(dir) = non_empty(ENV_STATE_DIR) {
            self.storage.state_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pacing = &self.pacing;
        if pacing.chunk_min == 0 {
            return Err(ConfigError::Invalid("pacing.chunk_min must be at least 1".into()));
        }
        if pacing.chunk_min > pacing.chunk_max {
            return Err(ConfigError::Invalid(format!(
                "pacing.chunk_min ({}) exceeds pacing.chunk_max ({})",
                pacing.chunk_min, pacing.chunk_max
            )));
        }
        if pacing.pause_min_secs > pacing.pause_max_secs {
            return Err(ConfigError::Invalid(format!(
                "pacing.pause_min_secs ({}) exceeds pacing.pause_max_secs ({})",
                pacing.pause_min_secs, pacing.pause_max_secs
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.window_months == 0 {
            return Err(ConfigError::Invalid("window_months must be at least 1".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}
