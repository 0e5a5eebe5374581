//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, plus raw TCP listeners for
//! transport failures.

use async_trait::async_trait;
use ig_crawler::config::Config;
use ig_crawler::crawler::{
    build_http_client, query_variables, request_signature, Crawler, Fetch, HttpFetcher,
    RetryPolicy, SIGNATURE_HEADER,
};
use ig_crawler::{fetch_profile_image, fetch_resources, CrawlerError, Resource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_AGENT: &str = "TestAgent/1.0";
const USER_ID: &str = "25025320";
const SEED: &str = "4f8732eb9ba7d1c8e8897a75d6474d4e";
const QUERY_ID: &str = "42323d64886122307be10013ad2dcc44";
const SCRIPT_PATH: &str = "/static/bundles/base/ProfilePageContainer.js/ebd3b9d1e3a5.js";
const FIRST_CURSOR: &str = "QVFDZmlyc3Q=";

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, username: &str) -> Config {
    let mut config = Config::new(username);
    config.site.base_url = base_url.to_string();
    config.user_agent.value = Some(USER_AGENT.to_string());
    config.crawler.error_delay_ms = 10; // Very short for testing
    config.crawler.max_retries = 3;
    config.crawler.request_timeout_secs = 5;
    config
}

fn html_page(payload: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head>
        <script type="text/javascript" src="{}" crossorigin="anonymous"></script>
        </head><body>
        <script type="text/javascript">window._sharedData = {};</script>
        </body></html>"#,
        SCRIPT_PATH, payload
    )
}

fn script_bundle() -> String {
    format!(
        r#"(window.webpackJsonp=window.webpackJsonp||[]).push([[5],{{a:function(e,t,n){{e.exports={{queryId:"9ca88e465c3f866a76f7adee3871bdd8"}}}},b:function(e,t,n){{e.exports={{queryId:"de8017ee0a7c9c45ec4260733d81ea31"}}}},c:function(e,t,n){{e.exports={{queryId:"{}"}}}}}}]);"#,
        QUERY_ID
    )
}

/// Timestamp of the `index`-th node of the feed, newest first
fn timestamp(index: usize) -> i64 {
    1_530_000_000 - (index as i64) * 3600
}

fn node(type_name: &str, shortcode: &str, index: usize) -> String {
    format!(
        r#"{{"node":{{"__typename":"{}","id":"{}","is_video":{},"shortcode":"{}","taken_at_timestamp":{},"display_url":"https://cdn.example.com/{}.jpg"}}}}"#,
        type_name,
        index,
        type_name == "GraphVideo",
        shortcode,
        timestamp(index),
        shortcode
    )
}

fn media_edge(nodes: &[String], cursor: Option<&str>) -> String {
    format!(
        r#"{{"count":17,"edges":[{}],"page_info":{{"has_next_page":{},"end_cursor":{}}}}}"#,
        nodes.join(","),
        cursor.is_some(),
        cursor.map(|c| format!("\"{}\"", c)).unwrap_or_else(|| "null".to_string())
    )
}

/// First page: one gallery of two, one video, ten images
fn first_page_nodes() -> Vec<String> {
    let mut nodes = vec![
        node("GraphSidecar", "gallery0", 0),
        node("GraphVideo", "video1", 1),
    ];
    nodes.extend((2..12).map(|i| node("GraphImage", &format!("image{}", i), i)));
    nodes
}

/// Second page: five images
fn second_page_nodes() -> Vec<String> {
    (12..17)
        .map(|i| node("GraphImage", &format!("image{}", i), i))
        .collect()
}

fn profile_payload(private: bool) -> String {
    profile_payload_with(private, &media_edge(&first_page_nodes(), Some(FIRST_CURSOR)))
}

fn profile_payload_with(private: bool, media: &str) -> String {
    format!(
        r#"{{"config":{{"viewer":null}},"rhx_gis":"{}","entry_data":{{"ProfilePage":[{{"logging_page_id":"profilePage_{}","graphql":{{"user":{{"id":"{}","username":"someone","is_private":{},"profile_pic_url_hd":"https://cdn.example.com/someone_hd.jpg","edge_owner_to_timeline_media":{}}}}}}}]}}}}"#,
        SEED,
        USER_ID,
        USER_ID,
        private,
        media
    )
}

fn query_response() -> String {
    query_response_with(&media_edge(&second_page_nodes(), None))
}

fn query_response_with(media: &str) -> String {
    format!(
        r#"{{"data":{{"user":{{"edge_owner_to_timeline_media":{}}}}},"status":"ok"}}"#,
        media
    )
}

fn gallery_payload() -> &'static str {
    r#"{"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{"__typename":"GraphSidecar","edge_sidecar_to_children":{"edges":[
        {"node":{"__typename":"GraphImage","is_video":false,"display_url":"https://cdn.example.com/gallery0_a.jpg"}},
        {"node":{"__typename":"GraphVideo","is_video":true,"display_url":"https://cdn.example.com/gallery0_b.jpg","video_url":"https://cdn.example.com/gallery0_b.mp4"}}
    ]}}}}]}}"#
}

fn video_payload() -> &'static str {
    r#"{"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{"__typename":"GraphVideo","is_video":true,"video_url":"https://cdn.example.com/video1.mp4"}}}]}}"#
}

fn html_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Mounts the profile page and the script bundle
async fn mount_profile(server: &MockServer, private: bool) {
    mount_profile_payload(server, profile_payload(private)).await;
}

async fn mount_profile_payload(server: &MockServer, payload: String) {
    Mock::given(method("GET"))
        .and(path("/someone/"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(html_response(html_page(&payload)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(SCRIPT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(script_bundle())
                .insert_header("content-type", "application/javascript"),
        )
        .mount(server)
        .await;
}

/// Mounts the post pages reachable from the first page
async fn mount_posts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/p/gallery0"))
        .respond_with(html_response(html_page(gallery_payload())))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/video1"))
        .respond_with(html_response(html_page(video_payload())))
        .mount(server)
        .await;
}

fn query_mock() -> Mock {
    query_mock_with(
        ResponseTemplate::new(200)
            .set_body_string(query_response())
            .insert_header("content-type", "application/json"),
    )
}

fn query_mock_with(response: ResponseTemplate) -> Mock {
    let variables = query_variables(USER_ID, 12, FIRST_CURSOR);
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .and(query_param("query_hash", QUERY_ID))
        .and(query_param("variables", variables.as_str()))
        .and(header(SIGNATURE_HEADER, request_signature(SEED, &variables).as_str()))
        .respond_with(response)
}

/// Mounts every page of a complete public feed
async fn mount_full_feed(server: &MockServer) {
    mount_profile(server, false).await;
    mount_posts(server).await;
    query_mock().mount(server).await;
}

#[tokio::test]
async fn test_full_crawl_collects_every_resource() {
    let mock_server = MockServer::start().await;
    mount_full_feed(&mock_server).await;

    let config = create_test_config(&mock_server.uri(), "someone");
    let resources = fetch_resources(&config).await.expect("Crawl should succeed");

    assert_eq!(resources.len(), 18);
    assert_eq!(resources.iter().filter(|r| r.is_video).count(), 2);

    let gallery: Vec<_> = resources
        .iter()
        .filter(|r| r.url.contains("gallery0"))
        .collect();
    assert_eq!(gallery.len(), 2);
    assert!(gallery.iter().all(|r| r.timestamp == timestamp(0)));

    assert!(resources
        .iter()
        .any(|r| r.url == "https://cdn.example.com/video1.mp4" && r.timestamp == timestamp(1)));
    assert!(resources
        .iter()
        .any(|r| r.url == "https://cdn.example.com/image16.jpg" && r.timestamp == timestamp(16)));
}

#[tokio::test]
async fn test_cutoff_skips_old_media_and_pagination() {
    let mock_server = MockServer::start().await;
    mount_profile(&mock_server, false).await;
    mount_posts(&mock_server).await;
    query_mock().expect(0).mount(&mock_server).await; // Should never be called

    let mut config = create_test_config(&mock_server.uri(), "someone");
    config.target.after = timestamp(3);

    let resources = fetch_resources(&config).await.expect("Crawl should succeed");

    // gallery (2) + video (1) + image2 (1)
    assert_eq!(resources.len(), 4);
    assert!(resources.iter().all(|r| r.timestamp > timestamp(3)));
}

#[tokio::test]
async fn test_repeated_crawls_return_the_same_size() {
    let mock_server = MockServer::start().await;
    mount_full_feed(&mock_server).await;

    let config = create_test_config(&mock_server.uri(), "someone");
    let first = fetch_resources(&config).await.expect("First crawl should succeed");
    let second = fetch_resources(&config).await.expect("Second crawl should succeed");

    assert_eq!(first.len(), second.len());
}

#[tokio::test]
async fn test_single_worker_crawl() {
    let mock_server = MockServer::start().await;
    mount_full_feed(&mock_server).await;

    let mut config = create_test_config(&mock_server.uri(), "someone");
    config.crawler.concurrency = 1;

    let resources = fetch_resources(&config).await.expect("Crawl should succeed");
    assert_eq!(resources.len(), 18);
}

#[tokio::test]
async fn test_profile_image() {
    let mock_server = MockServer::start().await;
    mount_profile(&mock_server, false).await;

    let config = create_test_config(&mock_server.uri(), "someone");
    let url = fetch_profile_image(&config).await.expect("Should find the image");

    assert_eq!(url, "https://cdn.example.com/someone_hd.jpg");
}

#[tokio::test]
async fn test_private_account_is_rejected() {
    let mock_server = MockServer::start().await;
    mount_profile(&mock_server, true).await;

    let config = create_test_config(&mock_server.uri(), "someone");
    let err = fetch_resources(&config).await.unwrap_err();

    assert!(matches!(err, CrawlerError::PrivateAccount { .. }));
    assert_eq!(err.to_string(), "\"someone\" is private account");
}

#[tokio::test]
async fn test_nonexistent_user_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/nobody/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1) // 404 is never retried
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "nobody");
    let err = fetch_resources(&config).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("not found \"{}/nobody/\"", mock_server.uri())
    );
}

#[tokio::test]
async fn test_failed_post_page_cancels_crawl() {
    let mock_server = MockServer::start().await;
    mount_profile(&mock_server, false).await;
    query_mock().mount(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/p/video1"))
        .respond_with(html_response(html_page(video_payload())))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/gallery0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "someone");
    let err = fetch_resources(&config).await.unwrap_err();

    match err {
        CrawlerError::NotFound { url } => {
            assert_eq!(url, format!("{}/p/gallery0", mock_server.uri()))
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let mock_server = MockServer::start().await;

    // Mounted first so it answers the first request only
    Mock::given(method("GET"))
        .and(path("/someone/"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_profile(&mock_server, false).await;

    let config = create_test_config(&mock_server.uri(), "someone");
    let url = fetch_profile_image(&config).await.expect("Retry should succeed");
    assert_eq!(url, "https://cdn.example.com/someone_hd.jpg");

    let requests = mock_server.received_requests().await.unwrap();
    let profile_requests: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/someone/")
        .collect();
    assert_eq!(profile_requests.len(), 2);
    assert_eq!(profile_requests[0].url, profile_requests[1].url);
}

#[tokio::test]
async fn test_persistent_throttling_exhausts_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/someone/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4) // first attempt + 3 retries
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri(), "someone");
    let err = fetch_resources(&config).await.unwrap_err();

    assert!(matches!(
        err,
        CrawlerError::RetriesExhausted { attempts: 4, .. }
    ));
}

#[tokio::test]
async fn test_crawler_over_http_fetcher() {
    let mock_server = MockServer::start().await;
    mount_full_feed(&mock_server).await;

    let config = create_test_config(&mock_server.uri(), "someone");
    let fetcher = HttpFetcher::from_config(&config.crawler, USER_AGENT).unwrap();
    let crawler = Crawler::with_fetcher(config, Arc::new(fetcher)).unwrap();

    let prepared = crawler.prepare().await.expect("Should prepare session");
    assert_eq!(prepared.query_id, QUERY_ID);
    assert_eq!(prepared.shared.rhx_gis, SEED);
}

/// Fetcher that counts how many requests are in flight at once
struct InFlightFetcher {
    inner: HttpFetcher,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightFetcher {
    fn new(inner: HttpFetcher) -> Self {
        Self {
            inner,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Fetch for InFlightFetcher {
    async fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> ig_crawler::Result<Vec<u8>> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.inner.fetch(url, headers).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_idle_worker_waits_for_pending_page() {
    let mock_server = MockServer::start().await;

    // The first page holds no media, so one worker takes the page while the
    // other finds every queue empty with work still pending.
    mount_profile_payload(
        &mock_server,
        profile_payload_with(false, &media_edge(&[], Some(FIRST_CURSOR))),
    )
    .await;

    let galleries: Vec<_> = (0..4)
        .map(|i| node("GraphSidecar", &format!("slow{}", i), i))
        .collect();
    query_mock_with(
        ResponseTemplate::new(200)
            .set_body_string(query_response_with(&media_edge(&galleries, None)))
            .insert_header("content-type", "application/json")
            .set_delay(Duration::from_millis(200)),
    )
    .expect(1)
    .mount(&mock_server)
    .await;

    for i in 0..4 {
        Mock::given(method("GET"))
            .and(path(format!("/p/slow{}", i)))
            .respond_with(html_response(html_page(gallery_payload())).set_delay(Duration::from_millis(300)))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let mut config = create_test_config(&mock_server.uri(), "someone");
    config.crawler.concurrency = 2;
    let fetcher = Arc::new(InFlightFetcher::new(
        HttpFetcher::from_config(&config.crawler, USER_AGENT).unwrap(),
    ));

    let crawler = Crawler::with_fetcher(config, fetcher.clone()).unwrap();
    let resources = crawler.fetch_resources().await.expect("Crawl should succeed");

    assert_eq!(resources.len(), 8);
    assert_eq!(
        fetcher.peak.load(Ordering::SeqCst),
        2,
        "both workers should fetch post pages concurrently"
    );
}

#[tokio::test]
async fn test_resource_data_downloads_media() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/t51/abc_n.jpg"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0])
                .insert_header("content-type", "image/jpeg"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let resource = Resource::image(format!("{}/t51/abc_n.jpg", mock_server.uri()), 1);
    let data = resource.data(&test_fetcher(3)).await.expect("Download should succeed");

    assert_eq!(data, vec![0xFF, 0xD8, 0xFF, 0xE0]);
}

#[tokio::test]
async fn test_resource_data_missing_file() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/t51/gone.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let resource = Resource::video(format!("{}/t51/gone.mp4", mock_server.uri()), 1);
    let err = resource.data(&test_fetcher(3)).await.unwrap_err();

    match err {
        CrawlerError::NotFound { url } => assert_eq!(url, resource.url),
        other => panic!("unexpected error: {}", other),
    }
}

/// Starts a listener that drops the first `drops` connections and then
/// answers every request with `hello`
async fn flaky_server(drops: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            if seen < drops {
                drop(socket);
                continue;
            }

            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello",
                    )
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/", addr), accepted)
}

fn test_fetcher(max_retries: u32) -> HttpFetcher {
    HttpFetcher::new(
        build_http_client(Duration::from_secs(5)).unwrap(),
        USER_AGENT,
        RetryPolicy {
            error_delay: Duration::from_millis(10),
            max_retries: Some(max_retries),
        },
    )
}

#[tokio::test]
async fn test_transport_failures_are_retried() {
    let (url, accepted) = flaky_server(3).await;

    let body = test_fetcher(5).fetch(&url, &[]).await.expect("Fourth attempt should succeed");

    assert_eq!(body, b"hello");
    assert_eq!(accepted.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_transport_failures_exhaust_retries() {
    let (url, accepted) = flaky_server(usize::MAX).await;

    let err = test_fetcher(2).fetch(&url, &[]).await.unwrap_err();

    match err {
        CrawlerError::RetriesExhausted { url: failed, attempts } => {
            assert_eq!(failed, url);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}
