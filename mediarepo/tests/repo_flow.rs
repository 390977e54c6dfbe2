//! Prefetch, fetch and purge through the repo facade against a mock API.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use mediarepo::cache::{CachedValue, MemoryCache, SharedCache, TtlPolicy};
use mediarepo::prefetch::FixedSampler;
use mediarepo::repo::{ApiConfig, MetadataRepo, QueryParams, QueryVariant};
use mediarepo::transport::TransportConfig;
use mediarepo::RepoConfig;
use mockito::{Matcher, Mock, Server, ServerGuard};

const OLD_TIMESTAMP: &str = "2015-03-01T12:00:00Z";

fn api_path() -> Matcher {
    Matcher::Regex(r"^/w/api\.php".to_string())
}

fn imageinfo_body(title: &str, timestamp: &str) -> String {
    serde_json::json!({
        "query": {
            "pages": {
                "7": {
                    "title": title,
                    "ns": 6,
                    "imagerepository": "local",
                    "imageinfo": [{
                        "url": format!("https://upload.example.org/{}", title),
                        "timestamp": timestamp,
                        "size": 1000,
                        "width": 640,
                        "height": 480,
                        "sha1": "deadbeef",
                        "thumburl": "https://upload.example.org/thumb/120px.jpg",
                        "thumbwidth": 120,
                        "thumbheight": 90
                    }]
                }
            }
        }
    })
    .to_string()
}

fn mock_title(server: &mut Server, title: &str, body: String, hits: usize) -> Mock {
    server
        .mock("GET", api_path())
        .match_query(Matcher::UrlEncoded("titles".into(), title.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(hits)
        .create()
}

fn config(server: &ServerGuard, ttl: TtlPolicy) -> RepoConfig {
    RepoConfig::default()
        .with_api(ApiConfig::default().with_endpoint(format!("{}/w/api.php", server.url())))
        .with_transport(
            TransportConfig::default()
                .with_connect_timeout(Duration::from_secs(2))
                .with_request_timeout(Duration::from_secs(5)),
        )
        .with_ttl(ttl)
}

fn repo(config: RepoConfig, sampler: FixedSampler) -> (MetadataRepo, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::default());
    let repo = MetadataRepo::with_cache(config, cache.clone())
        .unwrap()
        .with_sampler(Box::new(sampler));
    (repo, cache)
}

fn seed_near_expiry(repo: &MetadataRepo, cache: &MemoryCache, name: &str) {
    let key = repo.cache_key(name, &QueryParams::new());
    let body = imageinfo_body(&format!("File:{}", name), OLD_TIMESTAMP);
    cache
        .set(
            &key,
            CachedValue::Payload(Bytes::from(body)),
            Duration::from_secs(5),
        )
        .unwrap();
}

#[test]
fn test_prefetch_fetches_only_misses_when_refresh_declined() {
    let mut server = Server::new();
    let a = mock_title(&mut server, "File:A.png", imageinfo_body("File:A.png", OLD_TIMESTAMP), 0);
    let b = mock_title(&mut server, "File:B.png", imageinfo_body("File:B.png", OLD_TIMESTAMP), 1);

    let (mut repo, cache) = repo(config(&server, TtlPolicy::default()), FixedSampler::never_refresh());
    seed_near_expiry(&repo, &cache, "A.png");

    repo.prefetch(["A.png", "B.png"]).unwrap();
    let stats = repo.finalize().unwrap();
    assert_eq!(stats.fetched, 1);
    assert_eq!(stats.served_from_cache, 1);
    assert_eq!(stats.committed, 1);

    // Both lookups are served from the prefetch buffer.
    assert_eq!(repo.image_info("A.png").and_then(|i| i.width), Some(640));
    assert_eq!(repo.image_info("B.png").and_then(|i| i.height), Some(480));

    a.assert();
    b.assert();
    repo.close().unwrap();
}

#[test]
fn test_prefetch_refreshes_near_expiry_entry_when_forced() {
    let mut server = Server::new();
    let a = mock_title(&mut server, "File:A.png", imageinfo_body("File:A.png", OLD_TIMESTAMP), 1);
    let b = mock_title(&mut server, "File:B.png", imageinfo_body("File:B.png", OLD_TIMESTAMP), 1);

    let (mut repo, cache) = repo(config(&server, TtlPolicy::default()), FixedSampler::always_refresh());
    seed_near_expiry(&repo, &cache, "A.png");

    repo.prefetch(["A.png", "B.png"]).unwrap();
    let stats = repo.finalize().unwrap();
    assert_eq!(stats.fetched, 2);
    assert_eq!(stats.eager_refreshes, 1);

    // The refreshed entry is written back with an adaptive TTL far beyond 5s.
    let key = repo.cache_key("A.png", &QueryParams::new());
    let found = cache.get_multi(&[key.clone()]).unwrap();
    assert!(found[&key].remaining_ttl > Duration::from_secs(60));

    a.assert();
    b.assert();
    repo.close().unwrap();
}

#[test]
fn test_lookup_during_prefetch_does_not_duplicate_request() {
    let mut server = Server::new();
    let b = mock_title(&mut server, "File:B.png", imageinfo_body("File:B.png", OLD_TIMESTAMP), 1);

    let (mut repo, _) = repo(config(&server, TtlPolicy::default()), FixedSampler::never_refresh());
    repo.prefetch(["B.png"]).unwrap();
    assert!(repo.is_prefetch_pending());

    // Finalizes the outstanding batch instead of issuing a second GET.
    assert!(repo.fetch("B.png", &QueryParams::new()).is_some());
    assert!(!repo.is_prefetch_pending());
    b.assert();
}

#[test]
fn test_oversized_prefetch_payload_is_handed_off_once_and_never_cached() {
    let mut server = Server::new();
    let body = imageinfo_body("File:Big.tif", OLD_TIMESTAMP);
    let ttl = TtlPolicy::default().with_max_cached_bytes(64);
    assert!(body.len() > 64);
    let big = mock_title(&mut server, "File:Big.tif", body, 2);

    let (mut repo, cache) = repo(config(&server, ttl), FixedSampler::never_refresh());
    repo.prefetch(["Big.tif"]).unwrap();
    let stats = repo.finalize().unwrap();
    assert_eq!(stats.oversized, 1);
    assert_eq!(stats.committed, 0);

    let key = repo.cache_key("Big.tif", &QueryParams::new());
    assert!(cache.get(&key).unwrap().is_none());

    // First lookup consumes the hand-off without a request.
    assert!(repo.image_info("Big.tif").is_some());
    // The second goes to the network, and is again returned but not cached.
    assert!(repo.image_info("Big.tif").is_some());
    assert!(cache.get(&key).unwrap().is_none());

    big.assert();
}

#[test]
fn test_purge_forces_remote_fetch() {
    let mut server = Server::new();
    let v1 = mock_title(&mut server, "File:A.png", imageinfo_body("File:A.png", OLD_TIMESTAMP), 1);

    let (mut repo, _) = repo(config(&server, TtlPolicy::default()), FixedSampler::never_refresh());
    let first = repo.image_info("A.png").unwrap();
    let again = repo.image_info("A.png").unwrap();
    assert_eq!(first, again);
    v1.assert();
    v1.remove();

    let newer = "2024-01-01T00:00:00Z";
    let v2 = mock_title(&mut server, "File:A.png", imageinfo_body("File:A.png", newer), 1);

    assert_eq!(repo.purge("A.png"), 1);
    let after = repo.image_info("A.png").unwrap();
    assert_eq!(after.timestamp.as_deref(), Some(newer));
    v2.assert();
}

fn thumb_body(title: &str, thumburl: &str) -> String {
    serde_json::json!({
        "query": {
            "pages": {
                "7": {
                    "title": title,
                    "imageinfo": [{
                        "timestamp": OLD_TIMESTAMP,
                        "thumburl": thumburl,
                        "thumbwidth": 200,
                        "thumbheight": 150
                    }]
                }
            }
        }
    })
    .to_string()
}

fn mock_thumb(server: &mut Server, width: &str, thumburl: &str) -> Mock {
    server
        .mock("GET", api_path())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("titles".into(), "File:A.png".into()),
            Matcher::UrlEncoded("iiurlwidth".into(), width.into()),
        ]))
        .with_status(200)
        .with_body(thumb_body("File:A.png", thumburl))
        .expect(1)
        .create()
}

#[test]
fn test_purge_evicts_thumbnail_sizes_outside_variants() {
    let mut server = Server::new();
    let old = mock_thumb(&mut server, "200", "https://upload.example.org/old/200px-A.png");

    let (mut repo, _) = repo(config(&server, TtlPolicy::default()), FixedSampler::never_refresh());
    let before = repo.thumb_url("A.png", 200, None, None).unwrap();
    assert_eq!(before.url, "https://upload.example.org/old/200px-A.png");
    assert_eq!(repo.thumb_url("A.png", 200, None, None), Some(before));
    old.assert();
    old.remove();

    let new = mock_thumb(&mut server, "200", "https://upload.example.org/new/200px-A.png");
    assert_eq!(repo.purge("A.png"), 1);

    let after = repo.thumb_url("A.png", 200, None, None).unwrap();
    assert_eq!(after.url, "https://upload.example.org/new/200px-A.png");
    new.assert();
}

#[test]
fn test_failures_are_negative_cached_briefly() {
    let mut server = Server::new();
    let broken = server
        .mock("GET", api_path())
        .match_query(Matcher::UrlEncoded("titles".into(), "File:Bad.png".into()))
        .with_status(500)
        .expect(1)
        .create();
    let fresh = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let good = mock_title(&mut server, "File:Good.png", imageinfo_body("File:Good.png", &fresh), 1);

    let (mut repo, cache) = repo(config(&server, TtlPolicy::default()), FixedSampler::never_refresh());
    assert!(repo.fetch("Bad.png", &QueryParams::new()).is_none());
    assert!(repo.fetch("Bad.png", &QueryParams::new()).is_none());
    assert!(repo.fetch("Good.png", &QueryParams::new()).is_some());

    let bad_key = repo.cache_key("Bad.png", &QueryParams::new());
    let good_key = repo.cache_key("Good.png", &QueryParams::new());
    let found = cache.get_multi(&[bad_key.clone(), good_key.clone()]).unwrap();
    assert!(found[&bad_key].value.is_absent());
    assert!(found[&bad_key].remaining_ttl < found[&good_key].remaining_ttl);
    // Just-modified content sits at the TTL floor.
    assert!(found[&good_key].remaining_ttl <= Duration::from_secs(30));

    broken.assert();
    good.assert();
}

#[test]
fn test_failed_prefetch_leaves_entry_for_on_demand_retry() {
    let mut server = Server::new();
    let broken = server
        .mock("GET", api_path())
        .match_query(Matcher::UrlEncoded("titles".into(), "File:B.png".into()))
        .with_status(503)
        .expect(2)
        .create();

    let (mut repo, cache) = repo(config(&server, TtlPolicy::default()), FixedSampler::never_refresh());
    repo.prefetch(["B.png"]).unwrap();
    assert_eq!(repo.finalize().unwrap().failed, 1);

    let key = repo.cache_key("B.png", &QueryParams::new());
    assert!(cache.get(&key).unwrap().is_none());

    // The on-demand retry fails too, and that one is negative-cached.
    assert!(repo.fetch("B.png", &QueryParams::new()).is_none());
    assert_eq!(cache.get(&key).unwrap(), Some(CachedValue::Absent));
    broken.assert();
}

#[test]
fn test_variants_are_prefetched_as_sub_keys() {
    let mut server = Server::new();
    let api = mock_title(&mut server, "File:Clip.webm", imageinfo_body("File:Clip.webm", OLD_TIMESTAMP), 2);

    let mut config = config(&server, TtlPolicy::default());
    config.api = config
        .api
        .with_variant(QueryVariant::new("thumb120", [("iiurlwidth", "120")]));
    let (mut repo, _) = repo(config, FixedSampler::never_refresh());

    repo.prefetch(["Clip.webm"]).unwrap();
    let stats = repo.finalize().unwrap();
    assert_eq!(stats.names, 1);
    assert_eq!(stats.keys, 2);

    let thumb = repo.thumb_url("Clip.webm", 120, None, None).unwrap();
    assert_eq!(thumb.url, "https://upload.example.org/thumb/120px.jpg");
    assert_eq!(thumb.width, Some(120));

    // Purge drops both the primary and the variant entry.
    assert_eq!(repo.purge("Clip.webm"), 2);
    api.assert();
}

#[test]
fn test_find_by_sha1() {
    let mut server = Server::new();
    let body = serde_json::json!({
        "query": {"allimages": [
            {"name": "A.png", "title": "File:A.png", "timestamp": OLD_TIMESTAMP},
            {"name": "A copy.png", "title": "File:A copy.png", "timestamp": OLD_TIMESTAMP}
        ]}
    })
    .to_string();
    let mock = server
        .mock("GET", api_path())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("list".into(), "allimages".into()),
            Matcher::UrlEncoded("aisha1base36".into(), "abc123".into()),
        ]))
        .with_status(200)
        .with_body(body)
        .expect(1)
        .create();

    let (mut repo, _) = repo(config(&server, TtlPolicy::default()), FixedSampler::never_refresh());
    assert_eq!(repo.find_by_sha1("ABC123"), vec!["File:A.png", "File:A copy.png"]);
    assert_eq!(repo.find_by_sha1("abc123").len(), 2);
    mock.assert();
}

#[test]
fn test_api_error_is_treated_as_failure() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", api_path())
        .with_status(200)
        .with_body(r#"{"error":{"code":"maxlag","info":"Waiting for a database server"}}"#)
        .expect(1)
        .create();

    let (mut repo, _) = repo(config(&server, TtlPolicy::default()), FixedSampler::never_refresh());
    assert!(repo.image_info("A.png").is_none());
    assert!(repo.image_info("A.png").is_none());
    mock.assert();
}
