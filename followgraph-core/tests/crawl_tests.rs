// Tests for crawl orchestration against a mock remote

use followgraph_core::crawl::{CrawlOptions, describe_event, execute_crawl, lookup_profile};
use followgraph_scanner::{CrawlEvent, DelayLimits, Limits, UserGraph};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_profile(server: &MockServer, id: u64, username: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .and(query_param("username", username))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "user": { "id": id.to_string(), "username": username, "full_name": "Root" } }
        })))
        .mount(server)
        .await;
}

fn options(server: &MockServer) -> CrawlOptions {
    CrawlOptions {
        username: "root".to_string(),
        limits: Limits::default()
            .with_generations(0)
            .with_delays(DelayLimits::none()),
        session: None,
        base_url: Some(Url::parse(&server.uri()).unwrap()),
        download_images: false,
        show_progress_bars: false,
        handle_ctrl_c: false,
    }
}

// ============================================================================
// Profile Lookup Tests
// ============================================================================

#[tokio::test]
async fn test_lookup_profile() {
    let server = MockServer::start().await;
    mount_profile(&server, 10, "root").await;

    let base_url = Url::parse(&server.uri()).unwrap();
    let user = lookup_profile("root", None, Some(&base_url)).await.unwrap();
    assert_eq!(user.id, 10);
    assert_eq!(user.profile.username, "root");
}

#[tokio::test]
async fn test_lookup_profile_failure_has_context() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let base_url = Url::parse(&server.uri()).unwrap();
    let error = lookup_profile("missing", None, Some(&base_url)).await.unwrap_err();
    assert!(format!("{:#}", error).contains("Failed to look up 'missing'"));
}

// ============================================================================
// Crawl Execution Tests
// ============================================================================

#[tokio::test]
async fn test_execute_crawl_builds_report() {
    let server = MockServer::start().await;
    mount_profile(&server, 10, "root").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/friendships/10/followers/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [
                { "id": 11, "username": "a" },
                { "id": 12, "username": "b", "is_private": true }
            ]
        })))
        .mount(&server)
        .await;

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let callback = Arc::new(move |_event: &CrawlEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let report = execute_crawl(options(&server), Some(callback)).await.unwrap();

    assert_eq!(report.root.id, 10);
    assert_eq!(report.status(), "complete");
    assert_eq!(report.graph.len(), 3);
    assert_eq!(report.graph.get(10).unwrap().follower_ids, vec![11, 12]);
    assert!(report.done.contains(&10) && report.done.contains(&12));
    assert!(report.images.is_empty());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_execute_crawl_reports_fatal_error() {
    let server = MockServer::start().await;
    mount_profile(&server, 10, "root").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/friendships/10/followers/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "login_required",
            "status": "fail"
        })))
        .mount(&server)
        .await;

    let report = execute_crawl(options(&server), None).await.unwrap();

    assert_eq!(report.status(), "failed");
    assert!(report.error.unwrap().contains("login_required"));
    assert_eq!(report.graph.len(), 1);
}

#[tokio::test]
async fn test_execute_crawl_unknown_root_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "user": null } })))
        .mount(&server)
        .await;

    let result = execute_crawl(options(&server), None).await;
    assert!(result.is_err());
}

// ============================================================================
// Event Description Tests
// ============================================================================

#[test]
fn test_describe_rate_limit_events() {
    let graph = Arc::new(UserGraph::new());
    let batch = CrawlEvent::RateLimitBatch {
        user: 1,
        graph: graph.clone(),
        delay: Duration::from_secs(30 * 60),
    };
    assert_eq!(describe_event(&batch), "Batch limit reached, resuming in 30m 00s");

    let daily = CrawlEvent::RateLimitDaily {
        user: 1,
        graph,
        delay: Duration::from_secs(26 * 3600),
    };
    assert_eq!(describe_event(&daily), "Daily limit reached, resuming in 26h 00m");
}

#[test]
fn test_describe_depth_limit_event() {
    let event = CrawlEvent::DepthLimitFollower {
        user: 7,
        graph: Arc::new(UserGraph::new()),
        amount: 1000,
    };
    assert_eq!(describe_event(&event), "Kept 1000 followers of 7");
}
