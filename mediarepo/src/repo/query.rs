//! API query construction and canonical cache keys.
//!
//! Every lookup is reduced to a parameter map merged over the base
//! parameters (`action=query`, `format=json`, ...). The map is sorted, so
//! the outgoing URL, and the cache key hashed from it, depend only on the
//! parameters and never on the order a caller supplied them in.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use url::Url;

use crate::transport::Request;

/// Query parameters, kept sorted by name.
pub type QueryParams = BTreeMap<String, String>;

/// Parameter naming the page a lookup is about.
pub const TITLES_PARAM: &str = "titles";

/// Default API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://commons.wikimedia.org/w/api.php";

/// Default `iiprop` set requested for image info.
pub const DEFAULT_IIPROP: &[&str] = &[
    "timestamp",
    "user",
    "comment",
    "url",
    "size",
    "sha1",
    "metadata",
    "mime",
    "mediatype",
    "extmetadata",
];

/// A named extra parameter set prefetched alongside every name, such as a
/// thumbnail width or a video derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryVariant {
    pub name: String,
    pub params: QueryParams,
}

impl QueryVariant {
    pub fn new<I, K, V>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Remote API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub endpoint: String,
    /// Prefix for cache keys, so several repos can share one cache.
    pub repo_name: String,
    pub language: String,
    pub iiprop: Vec<String>,
    pub metadata_version: Option<String>,
    pub ext_metadata_multilang: bool,
    pub variants: Vec<QueryVariant>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            repo_name: "commons".to_string(),
            language: "en".to_string(),
            iiprop: DEFAULT_IIPROP.iter().map(|s| s.to_string()).collect(),
            metadata_version: Some("latest".to_string()),
            ext_metadata_multilang: false,
            variants: Vec::new(),
        }
    }
}

impl ApiConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_repo_name(mut self, name: impl Into<String>) -> Self {
        self.repo_name = name.into();
        self
    }

    pub fn with_variant(mut self, variant: QueryVariant) -> Self {
        self.variants.push(variant);
        self
    }
}

/// Normalise a file name to its title form: `File:` prefix, spaces as
/// underscores, first letter upper-cased.
pub fn normalize_title(name: &str) -> String {
    let trimmed = name.trim().replace(' ', "_");
    let trimmed = trimmed.trim_matches('_');
    let bare = match trimmed.split_once(':') {
        Some((ns, rest))
            if ns.eq_ignore_ascii_case("file") || ns.eq_ignore_ascii_case("image") =>
        {
            rest.trim_start_matches('_')
        }
        _ => trimmed,
    };

    let mut chars = bare.chars();
    let upper: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("File:{}", upper)
}

/// Compare two titles ignoring the space/underscore distinction.
pub fn titles_match(a: &str, b: &str) -> bool {
    a.replace(' ', "_") == b.replace(' ', "_")
}

/// Builds requests, URLs and cache keys for one API endpoint.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    config: ApiConfig,
    endpoint: Url,
}

impl QueryBuilder {
    pub fn new(config: ApiConfig) -> Result<Self, url::ParseError> {
        let endpoint = Url::parse(&config.endpoint)?;
        Ok(Self { config, endpoint })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Parameters sent with every request.
    pub fn base_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("action".into(), "query".into());
        params.insert("format".into(), "json".into());
        params.insert("redirects".into(), "true".into());
        params.insert("uselang".into(), self.config.language.clone());
        params
    }

    /// Image-info lookup for `name`, with `extra` layered on top.
    pub fn image_info_params(&self, name: &str, extra: &QueryParams) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert(TITLES_PARAM.into(), normalize_title(name));
        params.insert("prop".into(), "imageinfo".into());
        params.insert("iiprop".into(), self.config.iiprop.join("|"));
        if let Some(version) = &self.config.metadata_version {
            params.insert("iimetadataversion".into(), version.clone());
        }
        if self.config.ext_metadata_multilang {
            params.insert("iiextmetadatamultilang".into(), "1".into());
        }
        for (k, v) in extra {
            params.insert(k.clone(), v.clone());
        }
        params
    }

    /// Thumbnail parameters for [`image_info_params`](Self::image_info_params).
    pub fn thumb_params(width: u32, height: Option<u32>, param: Option<&str>) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("iiurlwidth".into(), width.to_string());
        if let Some(height) = height {
            params.insert("iiurlheight".into(), height.to_string());
        }
        if let Some(param) = param {
            params.insert("iiurlparam".into(), param.to_string());
        }
        params
    }

    /// Hash lookup via `list=allimages`.
    pub fn sha1_params(hash: &str) -> QueryParams {
        let mut params = QueryParams::new();
        params.insert("list".into(), "allimages".into());
        params.insert("aisha1base36".into(), hash.to_ascii_lowercase());
        params.insert("aiprop".into(), "timestamp|url|sha1".into());
        params
    }

    /// Base parameters merged with `params`; `params` wins on conflict.
    pub fn merged(&self, params: &QueryParams) -> QueryParams {
        let mut merged = self.base_params();
        for (k, v) in params {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Fully normalized outgoing URL.
    pub fn url(&self, params: &QueryParams) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(self.merged(params).iter());
        url
    }

    /// Cache key for a lookup: a hash of the normalized URL.
    pub fn cache_key(&self, params: &QueryParams) -> String {
        let digest = Sha256::digest(self.url(params).as_str().as_bytes());
        format!("{}:meta:{:x}", self.config.repo_name, digest)
    }

    /// GET request for a lookup.
    pub fn request(&self, params: &QueryParams) -> Request {
        let url = self.url(params);
        Request::get(url.as_str())
            .header("Accept", "application/json")
            .build()
    }
}
