//! INI file persistence for [`RepoConfig`].
//!
//! Missing sections and keys fall back to defaults. Durations are written
//! in (possibly fractional) seconds. Each `[variant.NAME]` section becomes
//! a [`QueryVariant`] whose keys and values are sent verbatim as extra
//! query parameters.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use tracing::debug;

use super::{ConfigError, RepoConfig};
use crate::repo::QueryVariant;

pub const CONFIG_DIR_NAME: &str = "mediarepo";
pub const CONFIG_FILE_NAME: &str = "config.ini";

const VARIANT_PREFIX: &str = "variant.";

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

impl RepoConfig {
    /// Load from the default path; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini_str(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(s) = ini.section(Some("api")) {
            let api = &mut config.api;
            read_string(s, "endpoint", &mut api.endpoint);
            read_string(s, "repo_name", &mut api.repo_name);
            read_string(s, "language", &mut api.language);
            if let Some(v) = s.get("iiprop") {
                api.iiprop = split_list(v);
            }
            if let Some(v) = s.get("metadata_version") {
                let v = v.trim();
                api.metadata_version = (!v.is_empty()).then(|| v.to_string());
            }
            read_parsed(s, "api", "ext_metadata_multilang", &mut api.ext_metadata_multilang)?;
        }

        if let Some(s) = ini.section(Some("transport")) {
            let t = &mut config.transport;
            read_secs(s, "transport", "connect_timeout_secs", &mut t.connect_timeout)?;
            read_secs(s, "transport", "request_timeout_secs", &mut t.request_timeout)?;
            read_parsed(s, "transport", "max_concurrent_requests", &mut t.max_concurrent_requests)?;
            read_parsed(s, "transport", "max_idle_per_host", &mut t.max_idle_per_host)?;
            read_parsed(s, "transport", "max_redirects", &mut t.max_redirects)?;
            read_parsed(s, "transport", "io_threads", &mut t.io_threads)?;
            read_string(s, "user_agent", &mut t.user_agent);
        }

        if let Some(s) = ini.section(Some("cache")) {
            read_parsed(s, "cache", "max_size_bytes", &mut config.cache.max_size_bytes)?;
            read_secs(s, "cache", "stale_grace_secs", &mut config.cache.stale_grace)?;
            let ttl = &mut config.ttl;
            read_secs(s, "cache", "min_ttl_secs", &mut ttl.min_ttl)?;
            read_secs(s, "cache", "max_ttl_secs", &mut ttl.max_ttl)?;
            read_parsed(s, "cache", "ttl_factor", &mut ttl.factor)?;
            read_secs(s, "cache", "negative_ttl_secs", &mut ttl.negative_ttl)?;
            read_parsed(s, "cache", "max_cached_bytes", &mut ttl.max_cached_bytes)?;
        }

        if let Some(s) = ini.section(Some("prefetch")) {
            let p = &mut config.prefetch;
            read_parsed(s, "prefetch", "enabled", &mut p.enabled)?;
            read_secs(s, "prefetch", "low_water_secs", &mut p.low_water)?;
            match s.get("refresh_window_secs") {
                Some(_) => read_secs(s, "prefetch", "refresh_window_secs", &mut p.refresh_window)?,
                None => p.refresh_window = p.low_water,
            }
        }

        if let Some(s) = ini.section(Some("logging")) {
            let l = &mut config.logging;
            read_string(s, "level", &mut l.level);
            read_string(s, "file_name", &mut l.file_name);
            if let Some(v) = s.get("directory") {
                let v = v.trim();
                l.directory = (!v.is_empty()).then(|| PathBuf::from(v));
            }
            read_parsed(s, "logging", "console", &mut l.console)?;
            read_parsed(s, "logging", "ansi", &mut l.ansi)?;
        }

        for (name, props) in ini.iter() {
            let Some(variant) = name.and_then(|n| n.strip_prefix(VARIANT_PREFIX)) else {
                continue;
            };
            if variant.is_empty() {
                return Err(ConfigError::Invalid("variant section without a name".into()));
            }
            config
                .api
                .variants
                .push(QueryVariant::new(variant, props.iter()));
        }

        Ok(config)
    }

    /// Render as an INI document with every known key.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        let api = &self.api;
        ini.with_section(Some("api"))
            .set("endpoint", api.endpoint.as_str())
            .set("repo_name", api.repo_name.as_str())
            .set("language", api.language.as_str())
            .set("iiprop", api.iiprop.join(","))
            .set(
                "metadata_version",
                api.metadata_version.clone().unwrap_or_default(),
            )
            .set("ext_metadata_multilang", api.ext_metadata_multilang.to_string());

        let t = &self.transport;
        ini.with_section(Some("transport"))
            .set("connect_timeout_secs", secs(t.connect_timeout))
            .set("request_timeout_secs", secs(t.request_timeout))
            .set("max_concurrent_requests", t.max_concurrent_requests.to_string())
            .set("max_idle_per_host", t.max_idle_per_host.to_string())
            .set("max_redirects", t.max_redirects.to_string())
            .set("io_threads", t.io_threads.to_string())
            .set("user_agent", t.user_agent.as_str());

        let ttl = &self.ttl;
        ini.with_section(Some("cache"))
            .set("max_size_bytes", self.cache.max_size_bytes.to_string())
            .set("stale_grace_secs", secs(self.cache.stale_grace))
            .set("min_ttl_secs", secs(ttl.min_ttl))
            .set("max_ttl_secs", secs(ttl.max_ttl))
            .set("ttl_factor", ttl.factor.to_string())
            .set("negative_ttl_secs", secs(ttl.negative_ttl))
            .set("max_cached_bytes", ttl.max_cached_bytes.to_string());

        let p = &self.prefetch;
        ini.with_section(Some("prefetch"))
            .set("enabled", p.enabled.to_string())
            .set("low_water_secs", secs(p.low_water))
            .set("refresh_window_secs", secs(p.refresh_window));

        let l = &self.logging;
        ini.with_section(Some("logging"))
            .set("level", l.level.as_str())
            .set(
                "directory",
                l.directory
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default(),
            )
            .set("file_name", l.file_name.as_str())
            .set("console", l.console.to_string())
            .set("ansi", l.ansi.to_string());

        for variant in &self.api.variants {
            let section = format!("{}{}", VARIANT_PREFIX, variant.name);
            for (k, v) in &variant.params {
                ini.with_section(Some(section.as_str()))
                    .set(k.as_str(), v.as_str());
            }
        }

        ini
    }

    pub fn to_ini_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.to_ini().write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Write to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, self.to_ini_string()).map_err(write_err)?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }
}

/// A `section.key` address of one setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey {
    section: &'static str,
    key: &'static str,
}

const KNOWN_KEYS: &[(&str, &str)] = &[
    ("api", "endpoint"),
    ("api", "repo_name"),
    ("api", "language"),
    ("api", "iiprop"),
    ("api", "metadata_version"),
    ("api", "ext_metadata_multilang"),
    ("transport", "connect_timeout_secs"),
    ("transport", "request_timeout_secs"),
    ("transport", "max_concurrent_requests"),
    ("transport", "max_idle_per_host"),
    ("transport", "max_redirects"),
    ("transport", "io_threads"),
    ("transport", "user_agent"),
    ("cache", "max_size_bytes"),
    ("cache", "stale_grace_secs"),
    ("cache", "min_ttl_secs"),
    ("cache", "max_ttl_secs"),
    ("cache", "ttl_factor"),
    ("cache", "negative_ttl_secs"),
    ("cache", "max_cached_bytes"),
    ("prefetch", "enabled"),
    ("prefetch", "low_water_secs"),
    ("prefetch", "refresh_window_secs"),
    ("logging", "level"),
    ("logging", "directory"),
    ("logging", "file_name"),
    ("logging", "console"),
    ("logging", "ansi"),
];

impl ConfigKey {
    /// Every settable key, in file order.
    pub fn all() -> impl Iterator<Item = ConfigKey> {
        KNOWN_KEYS
            .iter()
            .map(|&(section, key)| ConfigKey { section, key })
    }

    pub fn section(&self) -> &'static str {
        self.section
    }

    pub fn key_name(&self) -> &'static str {
        self.key
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Current value as it would be written to the file.
    pub fn get(&self, config: &RepoConfig) -> String {
        config
            .to_ini()
            .section(Some(self.section))
            .and_then(|s| s.get(self.key))
            .unwrap_or_default()
            .to_string()
    }

    /// Parse `value` into `config`. `config` is unchanged on error.
    pub fn set(&self, config: &mut RepoConfig, value: &str) -> Result<(), ConfigError> {
        let mut ini = config.to_ini();
        ini.with_section(Some(self.section)).set(self.key, value);
        *config = RepoConfig::from_ini(&ini)?;
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.key)
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (section, key) = s
            .split_once('.')
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))?;
        ConfigKey::all()
            .find(|k| k.section == section && k.key == key)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn secs(d: Duration) -> String {
    d.as_secs_f64().to_string()
}

fn split_list(v: &str) -> Vec<String> {
    v.split([',', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_string(section: &Properties, key: &str, target: &mut String) {
    if let Some(v) = section.get(key) {
        *target = v.trim().to_string();
    }
}

fn read_parsed<T>(
    section: &Properties,
    section_name: &str,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(v) = section.get(key) {
        *target = v.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: format!("{}.{}", section_name, key),
            value: v.to_string(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

fn read_secs(
    section: &Properties,
    section_name: &str,
    key: &str,
    target: &mut Duration,
) -> Result<(), ConfigError> {
    let Some(v) = section.get(key) else {
        return Ok(());
    };
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: format!("{}.{}", section_name, key),
        value: v.to_string(),
        reason,
    };
    let raw: f64 = v.trim().parse().map_err(|e: std::num::ParseFloatError| invalid(e.to_string()))?;
    *target = Duration::try_from_secs_f64(raw).map_err(|e| invalid(e.to_string()))?;
    Ok(())
}
