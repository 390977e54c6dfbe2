//! Repository configuration.
//!
//! [`RepoConfig`] aggregates the settings of every component. It can be
//! built in code with `Default` plus `with_*` setters, or read from an INI
//! file (see [`file`]):
//!
//! ```ini
//! [api]
//! endpoint = https://commons.wikimedia.org/w/api.php
//! language = en
//!
//! [transport]
//! connect_timeout_secs = 10
//! request_timeout_secs = 30
//!
//! [cache]
//! min_ttl_secs = 30
//! max_ttl_secs = 14400
//! negative_ttl_secs = 10
//!
//! [prefetch]
//! enabled = true
//! low_water_secs = 10
//!
//! [variant.thumb120]
//! iiurlwidth = 120
//! ```

pub mod file;

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::{MemoryCacheConfig, TtlPolicy, TtlPolicyError};
use crate::logging::{LogConfig, LoggingError};
use crate::prefetch::PrefetchConfig;
use crate::repo::ApiConfig;
use crate::transport::TransportConfig;

pub use file::{config_file_path, ConfigKey, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration file: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid TTL policy: {0}")]
    Ttl(#[from] TtlPolicyError),

    #[error("invalid logging settings: {0}")]
    Logging(#[from] LoggingError),

    #[error("{0}")]
    Invalid(String),
}

/// Settings for a [`MetadataRepo`](crate::repo::MetadataRepo) and its
/// components.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoConfig {
    pub api: ApiConfig,
    pub transport: TransportConfig,
    pub cache: MemoryCacheConfig,
    pub ttl: TtlPolicy,
    pub prefetch: PrefetchConfig,
    pub logging: LogConfig,
}

impl RepoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_cache(mut self, cache: MemoryCacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_prefetch(mut self, prefetch: PrefetchConfig) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ttl.validate()?;
        self.logging.level_filter()?;

        url::Url::parse(&self.api.endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "api.endpoint".into(),
            value: self.api.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if self.api.repo_name.is_empty() {
            return Err(ConfigError::Invalid("api.repo_name must not be empty".into()));
        }

        let t = &self.transport;
        if t.connect_timeout.is_zero() || t.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "transport timeouts must be non-zero".into(),
            ));
        }
        if t.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "transport.max_concurrent_requests must be at least 1".into(),
            ));
        }

        if self.prefetch.low_water.is_zero() || self.prefetch.refresh_window.is_zero() {
            return Err(ConfigError::Invalid(
                "prefetch.low_water_secs and prefetch.refresh_window_secs must be non-zero"
                    .into(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for variant in &self.api.variants {
            if !names.insert(variant.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "variant '{}' is defined more than once",
                    variant.name
                )));
            }
        }
        Ok(())
    }
}
