use std::time::Duration;

use harvest_core::config::TransportConfig;
use harvest_core::contract::{FilePart, HttpRequest, HttpResponse, MultipartForm, Transport};
use harvest_core::error::TransportError;
use harvest_core::transport::{HttpTransport, RetryPolicy};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_transport(max_retries: u32) -> HttpTransport {
    let retry = RetryPolicy {
        max_retries,
        backoff_factor: Duration::from_millis(1),
        max_retry_after: Duration::from_millis(5),
    };
    HttpTransport::with_retry_policy(&TransportConfig::default(), retry)
        .expect("transport builds")
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let response = fast_transport(4)
        .send(HttpRequest::get(format!("{}/flaky", server.uri())))
        .await
        .expect("eventually succeeds");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "ok");
}

#[tokio::test]
async fn post_is_retried_on_retryable_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/create"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let request = HttpRequest::post(format!("{}/create", server.uri()))
        .json(serde_json::json!({"name": "x"}));
    let response = fast_transport(2).send(request).await.expect("retried");
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn exhausted_retries_return_the_last_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(4)
        .mount(&server)
        .await;

    let response = fast_transport(3)
        .send(HttpRequest::get(server.uri()))
        .await
        .expect("a response, not an error");

    assert_eq!(response.status, 503);
    assert_eq!(response.body, "unavailable");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let response = fast_transport(4)
        .send(HttpRequest::get(server.uri()))
        .await
        .expect("response");
    assert_eq!(response.status, 404);
    assert!(!response.is_success());
}

#[tokio::test]
async fn refused_connection_is_a_connect_error_after_all_attempts() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let err = fast_transport(2)
        .send(HttpRequest::get(format!("http://127.0.0.1:{port}/nothing")))
        .await
        .expect_err("nothing listens there");

    match &err {
        TransportError::Connect { attempts, url, .. } => {
            assert_eq!(*attempts, 3);
            assert!(url.contains("/nothing"));
        }
        other => panic!("expected Connect, got {other:?}"),
    }
}

#[tokio::test]
async fn stalled_response_hits_the_client_read_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;
    let config = TransportConfig {
        read_timeout_secs: 1,
        ..TransportConfig::default()
    };
    let transport = HttpTransport::with_retry_policy(
        &config,
        RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        },
    )
    .expect("transport builds");

    let started = std::time::Instant::now();
    let err = transport
        .send(HttpRequest::get(server.uri()))
        .await
        .expect_err("server never answers in time");

    assert!(started.elapsed() < Duration::from_secs(8), "{:?}", started.elapsed());
    assert!(
        matches!(
            err,
            TransportError::Timeout { attempts: 1, .. } | TransportError::Network { attempts: 1, .. }
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn multipart_body_carries_fields_and_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let form = MultipartForm {
        fields: vec![("project_type".to_string(), "rlhf".to_string())],
        file: FilePart {
            field: "file".to_string(),
            filename: "batch_01.csv".to_string(),
            mime: "text/csv".to_string(),
            bytes: b"a,b\n1,2\n".to_vec(),
        },
    };
    let request = HttpRequest::post(format!("{}/upload", server.uri()))
        .header("Authorization", "Bearer secret")
        .multipart(form);
    fast_transport(0).send(request).await.expect("sent");

    let received = server.received_requests().await.expect("recording enabled");
    let body = String::from_utf8_lossy(&received[0].body);
    assert!(body.contains("name=\"project_type\""));
    assert!(body.contains("rlhf"));
    assert!(body.contains("filename=\"batch_01.csv\""));
    assert!(body.contains("a,b\n1,2\n"));
}

#[test]
fn backoff_doubles_from_the_factor() {
    let policy = RetryPolicy {
        max_retries: 4,
        backoff_factor: Duration::from_millis(1500),
        max_retry_after: Duration::from_secs(120),
    };
    assert_eq!(policy.backoff(1), Duration::from_millis(1500));
    assert_eq!(policy.backoff(2), Duration::from_millis(3000));
    assert_eq!(policy.backoff(3), Duration::from_millis(6000));
}

#[test]
fn default_config_maps_to_default_policy() {
    let policy = TransportConfig::default().retry_policy();
    assert_eq!(policy.max_retries, 4);
    assert_eq!(policy.backoff_factor, Duration::from_millis(1500));
}

fn response_with(status: u16, retry_after: Option<&str>) -> HttpResponse {
    HttpResponse {
        status,
        method: reqwest::Method::GET,
        url: "https://platform.test/x".to_string(),
        headers: retry_after
            .map(|value| vec![("retry-after".to_string(), value.to_string())])
            .unwrap_or_default(),
        body: String::new(),
    }
}

#[test]
fn retry_after_overrides_backoff_and_is_capped() {
    let policy = RetryPolicy::default();

    assert_eq!(
        policy.delay_for(1, &response_with(429, Some("7"))),
        Duration::from_secs(7)
    );
    assert_eq!(
        policy.delay_for(1, &response_with(503, Some("3600"))),
        Duration::from_secs(120)
    );
    // Only 429 and 503 carry a meaningful Retry-After.
    assert_eq!(
        policy.delay_for(2, &response_with(500, Some("7"))),
        Duration::from_millis(3000)
    );
    // HTTP-date values fall back to the computed backoff.
    assert_eq!(
        policy.delay_for(1, &response_with(429, Some("Wed, 21 Oct 2026 07:28:00 GMT"))),
        Duration::from_millis(1500)
    );
}
