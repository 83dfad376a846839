//! Config - JSON 設定ファイル
//!
//! ```json
//! {
//!   "store": { "kind": "s3", "bucket": "file-convo", "region": "ap-south-1" },
//!   "poll": { "interval_secs": 2, "max_wait_secs": 120 },
//!   "naming": "legacy"
//! }
//! ```
//!
//! `poll` と `naming` は省略可（既定は 2 秒間隔・最大 120 秒・legacy）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::{PolicyError, PollPolicy};
use crate::domain::NamingConvention;

#[derive(Debug, Error)]
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

    #[error("{field} must be a non-negative number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("store kind `s3` requires the `s3` feature")]
    S3Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub store: StoreConfig,

    #[serde(default)]
    pub poll: PollSettings,

    #[serde(default)]
    pub naming: NamingConvention,
}

impl RelayConfig {
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    S3(S3Settings),
    Local { root: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,

    /// S3 互換ストア（MinIO など）の URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// PollPolicy の秒単位表現
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: f64,
    pub max_wait_secs: f64,

    /// 1.0 で固定間隔
    pub backoff: f64,

    /// 省略時は `interval_secs`（backoff > 1.0 なら `max_wait_secs`）
    pub max_interval_secs: Option<f64>,

    pub max_failures: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            interval_secs: policy.interval.as_secs_f64(),
            max_wait_secs: policy.max_wait.as_secs_f64(),
            backoff: policy.multiplier,
            max_interval_secs: None,
            max_failures: policy.max_consecutive_failures,
        }
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration { field, value })
}

impl TryFrom<&PollSettings> for PollPolicy {
    type Error = ConfigError;

    fn try_from(settings: &PollSettings) -> Result<Self, Self::Error> {
        let interval = seconds("interval_secs", settings.interval_secs)?;
        let max_wait = seconds("max_wait_secs", settings.max_wait_secs)?;
        let mut policy = PollPolicy::fixed(interval, max_wait)?
            .with_failure_budget(settings.max_failures);

        let max_interval = match settings.max_interval_secs {
            Some(secs) => Some(seconds("max_interval_secs", secs)?),
            None if settings.backoff > 1.0 => Some(max_wait),
            None => None,
        };
        if settings.backoff != 1.0 || max_interval.is_some() {
            policy = policy.with_backoff(settings.backoff, max_interval.unwrap_or(interval))?;
        }
        Ok(policy)
    }
}
