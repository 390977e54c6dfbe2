//! Helpers shared across CLI commands.

use std::path::PathBuf;

use clap::Args;
use mediarepo::config::{config_file_path, RepoConfig};
use mediarepo::repo::QueryParams;
use mediarepo::MetadataRepo;

use crate::error::CliError;

/// Options accepted by every command.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the API endpoint from the configuration file
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// The configuration file this invocation reads and writes.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config_file_path)
    }
}

/// Load the configuration and apply command-line overrides.
pub fn load_config(args: &GlobalArgs) -> Result<RepoConfig, CliError> {
    let path = args.config_path();
    let mut config = if path.exists() {
        RepoConfig::load_from(&path)?
    } else if args.config.is_some() {
        return Err(CliError::Config(format!(
            "configuration file {} does not exist",
            path.display()
        )));
    } else {
        RepoConfig::default()
    };

    if let Some(endpoint) = &args.endpoint {
        config.api.endpoint = endpoint.clone();
    }
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    Ok(config)
}

pub fn open_repo(config: RepoConfig) -> Result<MetadataRepo, CliError> {
    Ok(MetadataRepo::new(config)?)
}

/// Parse a `name=value` query parameter.
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected name=value, got '{}'", s)),
    }
}

pub fn to_params(pairs: &[(String, String)]) -> QueryParams {
    pairs.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(config: Option<PathBuf>) -> GlobalArgs {
        GlobalArgs {
            config,
            endpoint: None,
            verbose: false,
        }
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("iiurlwidth=120"),
            Ok(("iiurlwidth".to_string(), "120".to_string()))
        );
        assert_eq!(
            parse_param("a=b=c"),
            Ok(("a".to_string(), "b=c".to_string()))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[api]\nlanguage = nl\n").unwrap();

        let mut args = args(Some(path));
        args.endpoint = Some("https://example.org/w/api.php".into());
        args.verbose = true;

        let config = load_config(&args).unwrap();
        assert_eq!(config.api.language, "nl");
        assert_eq!(config.api.endpoint, "https://example.org/w/api.php");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = load_config(&args(Some(dir.path().join("missing.ini"))));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
