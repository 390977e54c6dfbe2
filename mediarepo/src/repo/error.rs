use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::BatchError;

/// Failures constructing or driving a [`MetadataRepo`](super::MetadataRepo).
///
/// Lookups never return these: fetch failures degrade to "not found".
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid API endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(#[from] BatchError),
}
