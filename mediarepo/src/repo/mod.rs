//! Repository facade.
//!
//! [`MetadataRepo`] ties the transport, cache-aside store and prefetcher
//! together behind synchronous lookups. Keys are derived by [`QueryBuilder`]
//! from the fully normalized request URL, so a prefetched entry and a later
//! on-demand lookup for the same query always meet on the same key.
//!
//! # Example
//!
//! ```ignore
//! use mediarepo::config::RepoConfig;
//! use mediarepo::repo::{MetadataRepo, QueryParams};
//!
//! let mut repo = MetadataRepo::new(RepoConfig::load()?)?;
//! repo.prefetch(["Example.jpg", "Other.png"])?;
//! // ... lay out the page ...
//! let info = repo.image_info("Example.jpg");
//! repo.close()?;
//! ```

mod envelope;
mod error;
mod facade;
mod query;

pub use envelope::{
    classify_response, AllImagesEntry, ApiEnvelope, ApiError, ImageInfo, Page, QueryResult,
    ThumbInfo, TitleMapping,
};
pub use error::RepoError;
pub use facade::MetadataRepo;
pub use query::{
    normalize_title, titles_match, ApiConfig, QueryBuilder, QueryParams, QueryVariant,
    DEFAULT_ENDPOINT, DEFAULT_IIPROP, TITLES_PARAM,
};
