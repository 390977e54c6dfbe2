//! JSON response envelope of the remote API.
//!
//! Only the fields the lookups read are typed; `metadata` and
//! `extmetadata` are kept as raw JSON for callers that render them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::query::titles_match;
use crate::cache::FetchOutcome;
use crate::transport::Response;

/// Top-level `{query, error, warnings}` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEnvelope {
    pub query: Option<QueryResult>,
    pub error: Option<ApiError>,
    pub warnings: Option<serde_json::Value>,
}

/// `query` object: pages plus title rewrites and hash-lookup results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryResult {
    /// Keyed by page id; missing pages use negative ids.
    pub pages: BTreeMap<String, Page>,
    pub redirects: Vec<TitleMapping>,
    pub normalized: Vec<TitleMapping>,
    pub allimages: Vec<AllImagesEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleMapping {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    pub title: String,
    pub pageid: Option<u64>,
    pub ns: Option<i32>,
    pub imagerepository: Option<String>,
    pub imageinfo: Vec<ImageInfo>,
    /// Present (as an empty string) when the page does not exist.
    pub missing: Option<serde_json::Value>,
}

impl Page {
    pub fn is_missing(&self) -> bool {
        self.missing.is_some()
    }
}

/// One revision of a file's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageInfo {
    pub url: Option<String>,
    pub timestamp: Option<String>,
    pub size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sha1: Option<String>,
    pub mime: Option<String>,
    pub mediatype: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub extmetadata: Option<serde_json::Value>,
    pub thumburl: Option<String>,
    pub thumbwidth: Option<u32>,
    pub thumbheight: Option<u32>,
    pub thumberror: Option<String>,
    pub pageid: Option<u64>,
    pub descriptionurl: Option<String>,
    pub descriptionshorturl: Option<String>,
}

impl ImageInfo {
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

/// `list=allimages` result row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllImagesEntry {
    pub name: Option<String>,
    pub title: String,
    pub timestamp: Option<String>,
    pub url: Option<String>,
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiError {
    pub code: String,
    pub info: String,
}

/// Scaled rendition of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbInfo {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ThumbInfo {
    /// `None` when the server reported a `thumberror` or sent no URL.
    pub fn from_image_info(info: &ImageInfo) -> Option<Self> {
        if info.thumberror.is_some() {
            return None;
        }
        Some(Self {
            url: info.thumburl.clone()?,
            width: info.thumbwidth,
            height: info.thumbheight,
        })
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl ApiEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Newest modification time anywhere in the envelope.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        let query = self.query.as_ref()?;
        let from_pages = query
            .pages
            .values()
            .flat_map(|p| p.imageinfo.iter())
            .filter_map(ImageInfo::modified_at);
        let from_list = query
            .allimages
            .iter()
            .filter_map(|e| e.timestamp.as_deref().and_then(parse_timestamp));
        from_pages.chain(from_list).max()
    }

    /// Follow `normalized`, then `redirects`, from `title`.
    pub fn resolve_title(&self, title: &str) -> String {
        let Some(query) = &self.query else {
            return title.to_string();
        };
        let mut current = title.to_string();
        for mappings in [&query.normalized, &query.redirects] {
            if let Some(m) = mappings.iter().find(|m| titles_match(&m.from, &current)) {
                current = m.to.clone();
            }
        }
        current
    }

    /// Page for `title` after title resolution.
    pub fn page(&self, title: &str) -> Option<&Page> {
        let resolved = self.resolve_title(title);
        self.query
            .as_ref()?
            .pages
            .values()
            .find(|p| titles_match(&p.title, &resolved))
    }

    pub fn first_image_info(&self, title: &str) -> Option<&ImageInfo> {
        self.page(title)?.imageinfo.first()
    }

    /// Titles returned by a hash lookup.
    pub fn allimages_titles(&self) -> Vec<String> {
        self.query
            .as_ref()
            .map(|q| q.allimages.iter().map(|e| e.title.clone()).collect())
            .unwrap_or_default()
    }
}

/// Decide whether a raw response is a cacheable payload.
///
/// Transport failures, non-2xx statuses, undecodable bodies and API-level
/// errors are all failures; everything else, including a well-formed
/// "missing page" answer, is a payload.
pub fn classify_response(response: &Response) -> FetchOutcome {
    if !response.is_success() {
        return FetchOutcome::Failed {
            reason: response.status_line(),
        };
    }
    match ApiEnvelope::parse(&response.body) {
        Ok(envelope) => match &envelope.error {
            Some(err) => FetchOutcome::Failed {
                reason: format!("API error {}: {}", err.code, err.info),
            },
            None => FetchOutcome::Fetched {
                payload: response.body.clone(),
                last_modified: envelope.last_modified(),
            },
        },
        Err(e) => FetchOutcome::Failed {
            reason: format!("invalid JSON: {}", e),
        },
    }
}
