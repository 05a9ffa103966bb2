//! Mirror configuration.
//!
//! # Resolution order
//!
//! ```text
//! defaults  <  config file (YAML)  <  CLI flags  <  environment
//! ```
//!
//! `BUCKET_NAME` always replaces the configured bucket. `AWS_REGION` /
//! `AWS_DEFAULT_REGION` and `AWS_ENDPOINT_URL` only fill values that are
//! still unset, so an explicit flag or file entry wins over ambient AWS
//! environment.
//!
//! Environment lookups go through [`MirrorConfig::apply_env_with`]; tests
//! must pass a closure instead of touching the process environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Environment variable that overrides the destination container.
pub const BUCKET_ENV: &str = "BUCKET_NAME";

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Full runtime configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Destination container (S3 bucket name).
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom S3-compatible endpoint; switches the client to path-style addressing.
    pub endpoint: Option<String>,
    /// Source directory URL.
    pub data_url: Option<String>,
    /// URL of the single-payload API.
    pub api_url: Option<String>,
    /// Store key for the API payload.
    pub payload_key: Option<String>,
    /// Upload pass worker threads.
    pub workers: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Directory for transient downloads; the OS temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    /// Always read the recorded content digest instead of trusting
    /// MD5-shaped ETags (SSE-KMS buckets).
    pub verify_metadata: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: None,
            endpoint: None,
            data_url: None,
            api_url: None,
            payload_key: None,
            workers: DEFAULT_WORKERS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
            temp_dir: None,
            verify_metadata: false,
        }
    }
}

pub fn default_user_agent() -> String {
    format!("bucket-mirror/{}", env!("CARGO_PKG_VERSION"))
}

impl MirrorConfig {
    /// Load a YAML config file.
    ///
    /// Returns `ConfigError::Io` if unreadable, `ConfigError::Parse` (with
    /// path + line context) if malformed.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = non_empty(BUCKET_ENV) {
            self.bucket = Some(bucket);
        }
        if self.region.is_none() {
            self.region = non_empty("AWS_REGION").or_else(|| non_empty("AWS_DEFAULT_REGION"));
        }
        if self.endpoint.is_none() {
            self.endpoint = non_empty("AWS_ENDPOINT_URL");
        }
    }

    /// Check value ranges and URL syntax for every field that is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(bucket) = &self.bucket {
            if bucket.trim().is_empty() {
                return Err(ConfigError::MissingBucket);
            }
        }
        self.endpoint_url()?;
        if let Some(value) = &self.data_url {
            parse_url("data_url", value)?;
        }
        if let Some(value) = &self.api_url {
            parse_url("api_url", value)?;
        }
        Ok(())
    }

    pub fn bucket(&self) -> Result<&str, ConfigError> {
        self.bucket
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or(ConfigError::MissingBucket)
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn endpoint_url(&self) -> Result<Option<Url>, ConfigError> {
        self.endpoint
            .as_deref()
            .map(|value| parse_url("endpoint", value))
            .transpose()
    }

    pub fn data_url(&self) -> Result<Url, ConfigError> {
        let value = self.data_url.as_deref().ok_or(ConfigError::InvalidValue {
            field: "data_url",
            reason: "not set".to_string(),
        })?;
        parse_url("data_url", value)
    }

    pub fn api_url(&self) -> Result<Url, ConfigError> {
        let value = self.api_url.as_deref().ok_or(ConfigError::InvalidValue {
            field: "api_url",
            reason: "not set".to_string(),
        })?;
        parse_url("api_url", value)
    }

    pub fn payload_key(&self) -> Result<&str, ConfigError> {
        self.payload_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::InvalidValue {
                field: "payload_key",
                reason: "not set".to_string(),
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
