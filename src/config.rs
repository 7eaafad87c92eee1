use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Database;
use crate::error::FetchError;
use crate::eutils::DEFAULT_BASE_URL;
use crate::session::Credentials;

pub const DEFAULT_CONFIG_FILE: &str = "kira-seqfetch.json";
pub const DEFAULT_FALLBACK_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Unvalidated settings, as read from a JSON file and overlaid with CLI values.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub rettype: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub fallback_batch_size: Option<i64>,
    /// `0` means retry forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub pacing: Option<PacingEntry>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct PacingEntry {
    #[serde(default)]
    pub batch_delay_ms: Option<u64>,
    #[serde(default)]
    pub fallback_delay_ms: Option<u64>,
    #[serde(default)]
    pub transient_delay_ms: Option<u64>,
    #[serde(default)]
    pub bad_request_delay_ms: Option<u64>,
}

/// Delays applied between requests and before retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub batch_delay: Duration,
    pub fallback_delay: Duration,
    pub transient_delay: Duration,
    pub bad_request_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_secs(1),
            fallback_delay: Duration::from_secs(2),
            transient_delay: Duration::from_secs(10),
            bad_request_delay: Duration::from_secs(2),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            batch_delay: Duration::ZERO,
            fallback_delay: Duration::ZERO,
            transient_delay: Duration::ZERO,
            bad_request_delay: Duration::ZERO,
        }
    }

    fn apply(mut self, entry: &PacingEntry) -> Self {
        if let Some(ms) = entry.batch_delay_ms {
            self.batch_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = entry.fallback_delay_ms {
            self.fallback_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = entry.transient_delay_ms {
            self.transient_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = entry.bad_request_delay_ms {
            self.bad_request_delay = Duration::from_millis(ms);
        }
        self
    }
}

/// How many times one batch is attempted on recoverable network errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until the request goes through.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn allows(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub batch_size: usize,
    pub fallback_batch_size: usize,
    pub database: Database,
    pub rettype: String,
    pub credentials: Credentials,
    pub base_url: String,
    pub retry: RetryPolicy,
    pub pacing: Pacing,
}

impl RawConfig {
    /// Fills fields left unset here from `other`.
    pub fn or(self, other: RawConfig) -> RawConfig {
        RawConfig {
            input: self.input.or(other.input),
            output: self.output.or(other.output),
            batch_size: self.batch_size.or(other.batch_size),
            database: self.database.or(other.database),
            rettype: self.rettype.or(other.rettype),
            api_key: self.api_key.or(other.api_key),
            email: self.email.or(other.email),
            base_url: self.base_url.or(other.base_url),
            fallback_batch_size: self.fallback_batch_size.or(other.fallback_batch_size),
            max_attempts: self.max_attempts.or(other.max_attempts),
            pacing: self.pacing.or(other.pacing),
        }
    }

    pub fn resolve(self) -> Result<FetchConfig, FetchError> {
        let input = required(self.input, "input")?;
        let output = required(self.output, "output")?;
        let batch_size = positive(required_batch(self.batch_size)?)?;
        let fallback_batch_size = match self.fallback_batch_size {
            Some(value) => positive(value)?,
            None => DEFAULT_FALLBACK_BATCH_SIZE,
        };
        let database: Database = required(self.database, "database")?.parse()?;
        let rettype = required(self.rettype, "rettype")?;

        let retry = match self.max_attempts {
            Some(0) => RetryPolicy::unbounded(),
            Some(max) => RetryPolicy {
                max_attempts: Some(max),
            },
            None => RetryPolicy::default(),
        };
        let pacing = self
            .pacing
            .as_ref()
            .map(|entry| Pacing::default().apply(entry))
            .unwrap_or_default();

        Ok(FetchConfig {
            input: Utf8PathBuf::from(input),
            output: Utf8PathBuf::from(output),
            batch_size,
            fallback_batch_size,
            database,
            rettype,
            credentials: Credentials {
                api_key: non_blank(self.api_key),
                email: non_blank(self.email),
            },
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            retry,
            pacing,
        })
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the JSON config file, if any. An explicit path must exist; the
    /// default file in the working directory is optional.
    pub fn load(path: Option<&str>) -> Result<RawConfig, FetchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(RawConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| FetchError::ConfigParse(err.to_string()))
    }

    /// Credentials from `NCBI_API_KEY` and `NCBI_EMAIL`.
    pub fn from_env() -> RawConfig {
        RawConfig {
            api_key: std::env::var("NCBI_API_KEY").ok(),
            email: std::env::var("NCBI_EMAIL").ok(),
            ..RawConfig::default()
        }
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, FetchError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FetchError::InvalidConfig(format!("missing {name}")))
}

fn required_batch(value: Option<i64>) -> Result<i64, FetchError> {
    value.ok_or_else(|| FetchError::InvalidConfig("missing batch_size".to_string()))
}

fn positive(value: i64) -> Result<usize, FetchError> {
    if value <= 0 {
        return Err(FetchError::InvalidBatchSize(value));
    }
    usize::try_from(value).map_err(|_| FetchError::InvalidBatchSize(value))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
