use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use httpmock::MockServer;
use tower::ServiceExt;
use url::Url;

use weblog::application::analytics::{
    AnalyticsEvent, AnalyticsSink, DispatchError, IdentityUpdate,
};
use weblog::application::summary::SummaryService;
use weblog::application::tracking::TrackingService;
use weblog::config::AnalyticsSettings;
use weblog::infra::http::{HttpState, PIXEL_GIF, build_router};
use weblog::infra::posthog::PostHogSink;

const THUNDERBIRD: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:115.0) Gecko/20100101 Thunderbird/115.6.0";
const MAILMATE: &str = "MailMate (1.14r5937)";

fn router_with_sink(sink: Arc<dyn AnalyticsSink>) -> Router {
    build_router(HttpState {
        tracking: Arc::new(TrackingService::new(sink, Some("phc_test".to_string()))),
        summary: Arc::new(SummaryService::new(None)),
    })
}

fn posthog_router(server: &MockServer) -> Router {
    let settings = AnalyticsSettings {
        api_key: Some("phc_test".to_string()),
        host: Url::parse(&server.base_url()).expect("mock url"),
        timeout: Duration::from_secs(2),
    };
    router_with_sink(Arc::new(PostHogSink::new(&settings).expect("sink")))
}

async fn fetch(router: &Router, uri: &str, user_agent: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header(header::USER_AGENT, user_agent)
        .body(Body::empty())
        .expect("request should build");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn assert_pixel(response: Response) -> Response {
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "no-store, no-cache, must-revalidate, proxy-revalidate"
    );
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    assert_eq!(response.headers()[header::EXPIRES], "0");

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.expect("body");
    assert_eq!(bytes, *PIXEL_GIF);
    Response::from_parts(parts, Body::empty())
}

#[tokio::test]
async fn empty_query_still_serves_pixel_and_captures() {
    let server = MockServer::start();
    let capture = server.mock(|when, then| {
        when.method("POST")
            .path("/capture/")
            .json_body_includes(r#"{"api_key":"phc_test","event":"Email Opened","properties":{"campaign":"general","emailClient":"unknown","ipAddress":"unknown"}}"#);
        then.status(200).body("{}");
    });

    let router = posthog_router(&server);
    let response = assert_pixel(fetch(&router, "/api/img", "curl/8.5").await).await;

    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
    capture.assert();
}

#[tokio::test]
async fn recipient_email_is_the_distinct_id_and_is_identified() {
    let server = MockServer::start();
    let capture = server.mock(|when, then| {
        when.method("POST")
            .path("/capture/")
            .json_body_includes(r#"{"distinct_id":"alice@example.com","properties":{"recipientEmail":"alice@example.com","emailId":"newsletter-42","campaign":"spring","emailClient":"Thunderbird"}}"#);
        then.status(200).body("{}");
    });
    let identify = server.mock(|when, then| {
        when.method("POST")
            .path("/identify/")
            .json_body_includes(r#"{"distinct_id":"alice@example.com","properties":{"name":"Alice","email":"alice@example.com","emailClient":"Thunderbird","totalEmailOpens":1}}"#);
        then.status(200).body("{}");
    });

    let router = posthog_router(&server);
    assert_pixel(
        fetch(
            &router,
            "/api/img?recipientName=Alice&recipientEmail=alice%40example.com&campaign=spring&id=newsletter-42",
            THUNDERBIRD,
        )
        .await,
    )
    .await;

    capture.assert();
    identify.assert();
}

#[tokio::test]
async fn custom_id_becomes_distinct_id_without_email() {
    let server = MockServer::start();
    let capture = server.mock(|when, then| {
        when.method("POST")
            .path("/capture/")
            .json_body_includes(r#"{"distinct_id":"custom123","properties":{"emailId":"custom123"}}"#);
        then.status(200).body("{}");
    });

    let router = posthog_router(&server);
    assert_pixel(fetch(&router, "/api/img?id=custom123", THUNDERBIRD).await).await;

    capture.assert();
}

#[tokio::test]
async fn gmail_is_detected_from_referer() {
    let server = MockServer::start();
    let capture = server.mock(|when, then| {
        when.method("POST")
            .path("/capture/")
            .json_body_includes(r#"{"properties":{"emailClient":"Gmail","referer":"https://mail.google.com/mail/u/0/"}}"#);
        then.status(200).body("{}");
    });

    let router = posthog_router(&server);
    let request = Request::builder()
        .uri("/api/img")
        .header(header::USER_AGENT, "Mozilla/5.0 (via ggpht.com GoogleImageProxy)")
        .header(header::REFERER, "https://mail.google.com/mail/u/0/")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::empty())
        .expect("request should build");
    let response = router.oneshot(request).await.expect("router should respond");
    assert_pixel(response).await;

    capture.assert();
}

#[tokio::test]
async fn test_flag_overrides_mailmate_suppression() {
    let server = MockServer::start();
    let capture = server.mock(|when, then| {
        when.method("POST")
            .path("/capture/")
            .json_body_includes(r#"{"properties":{"test":"1","emailClient":"MailMate"}}"#);
        then.status(200).body("{}");
    });

    let router = posthog_router(&server);
    let response = assert_pixel(fetch(&router, "/api/img?test=1", MAILMATE).await).await;

    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
    capture.assert();
}

#[tokio::test]
async fn collector_errors_do_not_change_the_pixel() {
    let server = MockServer::start();
    let capture = server.mock(|when, then| {
        when.method("POST").path("/capture/");
        then.status(503).body("unavailable");
    });
    let identify = server.mock(|when, then| {
        when.method("POST").path("/identify/");
        then.status(500).body("boom");
    });

    let router = posthog_router(&server);
    assert_pixel(
        fetch(
            &router,
            "/api/img?recipientEmail=bob%40example.com",
            THUNDERBIRD,
        )
        .await,
    )
    .await;

    capture.assert();
    identify.assert();
}

#[tokio::test]
async fn unreachable_collector_still_serves_pixel() {
    let settings = AnalyticsSettings {
        api_key: Some("phc_test".to_string()),
        // Port 9 (discard) on localhost is expected to refuse connections.
        host: Url::parse("http://127.0.0.1:9").expect("url"),
        timeout: Duration::from_millis(500),
    };
    let router = router_with_sink(Arc::new(PostHogSink::new(&settings).expect("sink")));

    assert_pixel(
        fetch(
            &router,
            "/api/img?recipientEmail=carol%40example.com",
            THUNDERBIRD,
        )
        .await,
    )
    .await;
}

#[derive(Default)]
struct CountingSink {
    captures: AtomicUsize,
    identifies: AtomicUsize,
}

#[async_trait]
impl AnalyticsSink for CountingSink {
    async fn capture(&self, _event: &AnalyticsEvent) -> Result<(), DispatchError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Err(DispatchError::transport("network unreachable"))
    }

    async fn identify(&self, _update: &IdentityUpdate) -> Result<(), DispatchError> {
        self.identifies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn mailmate_without_test_flag_is_suppressed() {
    let sink = Arc::new(CountingSink::default());
    let router = router_with_sink(sink.clone());

    let response = assert_pixel(
        fetch(
            &router,
            "/api/img?recipientEmail=alice%40example.com",
            MAILMATE,
        )
        .await,
    )
    .await;

    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(sink.captures.load(Ordering::SeqCst), 0);
    assert_eq!(sink.identifies.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn identify_is_skipped_without_recipient_email() {
    let sink = Arc::new(CountingSink::default());
    let router = router_with_sink(sink.clone());

    assert_pixel(fetch(&router, "/api/img?recipientName=Erin", THUNDERBIRD).await).await;

    assert_eq!(sink.captures.load(Ordering::SeqCst), 1);
    assert_eq!(sink.identifies.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_requests_dispatch_independently() {
    let sink = Arc::new(CountingSink::default());
    let router = router_with_sink(sink.clone());

    let uri = "/api/img?recipientEmail=dave%40example.com&subject=Hi";
    for _ in 0..2 {
        assert_pixel(fetch(&router, uri, THUNDERBIRD).await).await;
    }

    assert_eq!(sink.captures.load(Ordering::SeqCst), 2);
    assert_eq!(sink.identifies.load(Ordering::SeqCst), 2);
}

struct PanickingSink;

#[async_trait]
impl AnalyticsSink for PanickingSink {
    async fn capture(&self, _event: &AnalyticsEvent) -> Result<(), DispatchError> {
        panic!("collector client exploded");
    }

    async fn identify(&self, _update: &IdentityUpdate) -> Result<(), DispatchError> {
        Ok(())
    }
}

#[tokio::test]
async fn panics_during_dispatch_fall_back_to_plain_pixel() {
    let router = router_with_sink(Arc::new(PanickingSink));

    let response = assert_pixel(fetch(&router, "/api/img", THUNDERBIRD).await).await;

    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<AnalyticsEvent>>,
    identities: Mutex<Vec<IdentityUpdate>>,
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), DispatchError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn identify(&self, update: &IdentityUpdate) -> Result<(), DispatchError> {
        self.identities.lock().unwrap().push(update.clone());
        Ok(())
    }
}

#[tokio::test]
async fn repeated_query_keys_keep_the_first_value_of_each() {
    let sink = Arc::new(RecordingSink::default());
    let router = router_with_sink(sink.clone());

    let response = assert_pixel(
        fetch(
            &router,
            "/api/img?recipientEmail=alice%40example.com&campaign=spring&id=a&id=b&test=1",
            "MailMate/1",
        )
        .await,
    )
    .await;

    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.distinct_id, "alice@example.com");
    assert_eq!(event.properties.email_id, "a");
    assert_eq!(event.properties.campaign, "spring");
    assert_eq!(event.properties.test.as_deref(), Some("1"));
    assert_eq!(sink.identities.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let router = router_with_sink(Arc::new(CountingSink::default()));

    let response = fetch(&router, "/_health", "uptime-check").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = fetch(&router, "/wp-admin", "uptime-check").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(value, serde_json::json!({ "error": "Not found" }));
}
