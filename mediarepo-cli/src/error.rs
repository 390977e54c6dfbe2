//! CLI error type.

use std::fmt;

use mediarepo::config::ConfigError;
use mediarepo::logging::LoggingError;
use mediarepo::RepoError;

/// Errors reported to the user before exiting non-zero.
#[derive(Debug)]
pub enum CliError {
    Config(String),
    Logging(LoggingError),
    Repo(RepoError),
    NotFound(String),
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Failed to set up logging: {}", e),
            CliError::Repo(e) => write!(f, "{}", e),
            CliError::NotFound(what) => write!(f, "Not found: {}", what),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Repo(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<RepoError> for CliError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Config(e) => CliError::Config(e.to_string()),
            other => CliError::Repo(other),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}
