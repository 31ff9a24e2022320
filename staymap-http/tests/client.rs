use reqwest::StatusCode;
use staymap_http::cache::HttpCache;
use staymap_http::throttle::{AutoThrottle, ThrottleSettings};
use staymap_http::{HttpClient, HttpError, RequestOpts};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UA: &str = "staymap-tests/1.0";

fn url_for(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn sends_the_configured_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hotel/fr/abc.html"))
        .and(header("user-agent", UA))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(UA).unwrap();
    let body = client
        .get_text(&url_for(&server, "/hotel/fr/abc.html"), RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(body, "<html>hi</html>");
}

#[tokio::test]
async fn not_found_is_a_distinguishable_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such hotel"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(UA).unwrap();
    let err = client
        .get_text(&url_for(&server, "/missing"), RequestOpts::default())
        .await
        .unwrap_err();

    match err {
        HttpError::Status {
            status, message, ..
        } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert!(message.contains("no such hotel"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn get_page_returns_non_success_without_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = HttpClient::new(UA).unwrap();
    let page = client
        .get_page(&url_for(&server, "/forbidden"), RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(page.status, StatusCode::FORBIDDEN);
    assert!(!page.is_success());
    assert!(!page.from_cache);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let client = HttpClient::new(UA).unwrap().with_retries(2);
    let body = client
        .get_text(&url_for(&server, "/flaky"), RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(body, "recovered");
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let client = HttpClient::new(UA).unwrap().with_retries(1);
    let err = client
        .get_text(&url_for(&server, "/down"), RequestOpts::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn cached_pages_skip_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("results"))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let client = HttpClient::new(UA)
        .unwrap()
        .with_cache(HttpCache::new(tmp.path()));
    let url = url_for(&server, "/search");

    let first = client.get_page(&url, RequestOpts::default()).await.unwrap();
    let second = client.get_page(&url, RequestOpts::default()).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.body, "results");
}

#[tokio::test]
async fn cached_pages_keep_their_redirect_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/searchresults.html"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/fr/results/page.html"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fr/results/page.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<a href=\"hotel.html\">"))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let client = HttpClient::new(UA)
        .unwrap()
        .with_cache(HttpCache::new(tmp.path()));
    let url = url_for(&server, "/searchresults.html");

    let first = client.get_page(&url, RequestOpts::default()).await.unwrap();
    let second = client.get_page(&url, RequestOpts::default()).await.unwrap();

    assert_eq!(first.url.path(), "/fr/results/page.html");
    assert!(second.from_cache);
    assert_eq!(second.url, first.url);
    assert_eq!(
        second.url.join("hotel.html").unwrap(),
        url_for(&server, "/fr/results/hotel.html")
    );
}

#[tokio::test]
async fn unreadable_cache_entries_fall_back_to_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let url = url_for(&server, "/odd");
    let cache = HttpCache::new(tmp.path());
    // no such HTTP status
    assert!(cache.store(&url, &url, 1000, "stale").await.unwrap());

    let client = HttpClient::new(UA).unwrap().with_cache(cache);
    let page = client.get_page(&url, RequestOpts::default()).await.unwrap();

    assert!(!page.from_cache);
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body, "fresh");
}

#[tokio::test]
async fn cached_failures_stay_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let client = HttpClient::new(UA)
        .unwrap()
        .with_cache(HttpCache::new(tmp.path()));
    let url = url_for(&server, "/gone");

    for _ in 0..2 {
        let err = client.get_text(&url, RequestOpts::default()).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }
}

#[tokio::test]
async fn throttle_learns_from_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let settings = ThrottleSettings {
        start_delay: Duration::from_millis(50),
        min_delay: Duration::ZERO,
        max_delay: Duration::from_secs(1),
        target_concurrency: 1.0,
    };
    let client = HttpClient::new(UA)
        .unwrap()
        .with_throttle(AutoThrottle::new(settings));
    let url = url_for(&server, "/fast");
    let host = url.host_str().unwrap().to_string();

    client.get_page(&url, RequestOpts::default()).await.unwrap();

    // a local mock answers far quicker than the start delay
    let delay = client.throttle().unwrap().current_delay(&host);
    assert!(delay < Duration::from_millis(50), "delay was {delay:?}");
}
