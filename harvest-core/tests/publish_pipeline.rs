use std::time::Duration;

use harvest_core::config::{PublishConfig, TransportConfig};
use harvest_core::contract::{
    HttpResponse, MockTransport, PendingFile, PipelineState, Publisher, RequestBody,
};
use harvest_core::publish::{HttpPublisher, RemoteObjectRef};
use harvest_core::transport::{HttpTransport, RetryPolicy};
use reqwest::Method;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MAX_RETRIES: u32 = 2;

fn target(server: &MockServer) -> PublishConfig {
    PublishConfig {
        upload_url: format!("{}/upload", server.uri()),
        batches_url: format!("{}/batches", server.uri()),
        project_id: 204,
        project_name: "Street Scenes".to_string(),
        project_type: "rlhf".to_string(),
    }
}

fn publisher(server: &MockServer) -> HttpPublisher<HttpTransport> {
    let transport = HttpTransport::with_retry_policy(
        &TransportConfig::default(),
        RetryPolicy {
            max_retries: MAX_RETRIES,
            backoff_factor: Duration::from_millis(1),
            max_retry_after: Duration::from_millis(1),
        },
    )
    .expect("transport builds");
    HttpPublisher::new(transport, target(server), "tok")
}

fn csv_file() -> PendingFile {
    PendingFile::new("week_12.csv", b"metadata,image\n{},a.png\n".to_vec())
}

async fn mount_upload_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fileLink": "https://storage.test/uploads/week%2012%20final.csv"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[test]
fn object_name_is_the_decoded_last_segment() {
    let object = RemoteObjectRef::from_link("https://storage.test/a/b/My%20File%281%29.csv");
    assert_eq!(object.object_name, "My File(1).csv");
    assert_eq!(RemoteObjectRef::from_link("plain").object_name, "plain");
}

#[test]
fn batch_name_drops_only_the_final_extension() {
    assert_eq!(PendingFile::new("a.b.csv", Vec::new()).batch_name(), "a.b");
    assert_eq!(PendingFile::new("noext", Vec::new()).batch_name(), "noext");
}

#[tokio::test]
async fn happy_path_uploads_registers_and_imports() {
    let server = MockServer::start().await;
    mount_upload_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/batches"))
        .and(header("authorization", "Bearer tok"))
        .and(body_partial_json(json!({
            "name": "week_12",
            "folder": "https://storage.test/uploads/week%2012%20final.csv",
            "description": "",
            "status": "draft",
            "files": [],
            "isRLHFFolder": true,
            "project": {
                "id": 204,
                "name": "Street Scenes",
                "status": "ongoing",
                "projectType": "rlhf",
                "readonly": false
            },
            "sourceFiles": ["week 12 final.csv"],
            "projectId": 204,
            "projectType": "rlhf"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batches/42/import-rlhf"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = publisher(&server).publish(csv_file()).await;

    assert!(outcome.ok, "{}", outcome.message);
    assert_eq!(outcome.batch_id, Some(42));
    assert_eq!(outcome.message, "Uploaded and imported. Batch ID: 42");
    assert_eq!(outcome.state(), PipelineState::Done);
    assert_eq!(outcome.orphaned_file_link, None);
}

#[tokio::test]
async fn registration_failure_stops_before_import() {
    let server = MockServer::start().await;
    mount_upload_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/batches"))
        .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
        .expect(1 + MAX_RETRIES as u64)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batches/42/import-rlhf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = publisher(&server).publish(csv_file()).await;

    assert!(!outcome.ok);
    assert_eq!(outcome.failed_at, Some(PipelineState::Registering));
    assert_eq!(outcome.batch_id, None);
    assert!(
        outcome.message.starts_with("Registration step failed:\nHTTP 500\nURL: POST "),
        "{}",
        outcome.message
    );
    assert!(outcome.message.ends_with("Body: db down"));
    assert_eq!(
        outcome.orphaned_file_link.as_deref(),
        Some("https://storage.test/uploads/week%2012%20final.csv")
    );
}

#[tokio::test]
async fn upload_returning_non_json_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let outcome = publisher(&server).publish(csv_file()).await;

    assert_eq!(outcome.failed_at, Some(PipelineState::Uploading));
    assert!(outcome.message.starts_with("Upload step returned non-JSON:\nHTTP 200"));
    assert_eq!(outcome.orphaned_file_link, None);
}

#[tokio::test]
async fn upload_without_file_link_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batches"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = publisher(&server).publish(csv_file()).await;

    assert!(outcome
        .message
        .starts_with("Upload step returned no 'fileLink' in response:"));
}

#[tokio::test]
async fn import_failure_keeps_the_batch_id() {
    let server = MockServer::start().await;
    mount_upload_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/batches"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 42})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batches/42/import-rlhf"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "bad csv"})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = publisher(&server).publish(csv_file()).await;

    assert_eq!(outcome.failed_at, Some(PipelineState::Importing));
    assert_eq!(outcome.batch_id, Some(42));
    assert!(outcome.message.starts_with("Import step failed:\nHTTP 400"));
    assert!(outcome.orphaned_file_link.is_some());
}

#[tokio::test]
async fn import_with_json_body_succeeds() {
    let server = MockServer::start().await;
    mount_upload_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/batches"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batches/9/import-rlhf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"imported": 12})))
        .mount(&server)
        .await;

    let publisher = publisher(&server);
    assert_eq!(
        publisher.import(9).await.expect("imported"),
        Some(json!({"imported": 12}))
    );
    assert!(publisher.publish(csv_file()).await.ok);
}

#[tokio::test]
async fn rejected_upload_never_reaches_registration() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|request| request.method == Method::POST && request.url.ends_with("/upload"))
        .times(1)
        .returning(|request| {
            Ok(HttpResponse {
                status: 401,
                method: request.method,
                url: request.url,
                headers: vec![("content-type".to_string(), "text/plain".to_string())],
                body: "unauthorised".to_string(),
            })
        });

    let config = PublishConfig {
        upload_url: "https://platform.test/upload".to_string(),
        project_id: 1,
        project_name: "p".to_string(),
        ..PublishConfig::default()
    };
    let outcome = HttpPublisher::new(transport, config, "Bearer tok")
        .publish(csv_file())
        .await;

    assert_eq!(outcome.failed_at, Some(PipelineState::Uploading));
    assert_eq!(
        outcome.message,
        "Upload step failed:\nHTTP 401\nURL: POST https://platform.test/upload\nHeaders: {'content-type': 'text/plain'}\nBody: unauthorised"
    );
}

#[tokio::test]
async fn long_bodies_are_cut_in_diagnostics() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(1).returning(|request| {
        Ok(HttpResponse {
            status: 500,
            method: request.method,
            url: request.url,
            headers: Vec::new(),
            body: "x".repeat(5000),
        })
    });
    let outcome = HttpPublisher::new(transport, PublishConfig::default(), "tok")
        .publish(csv_file())
        .await;
    let body = outcome.message.rsplit("Body: ").next().expect("body line");
    assert_eq!(body.len(), 2000);
}

#[tokio::test]
async fn import_sends_only_the_auth_header_and_no_body() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|request| {
            request.method == Method::POST
                && request.url == "https://platform.test/batches/9/import-rlhf"
                && request.header_value("authorization") == Some("Bearer tok")
                && request.header_value("content-type").is_none()
                && matches!(request.body, RequestBody::Empty)
        })
        .times(1)
        .returning(|request| {
            Ok(HttpResponse {
                status: 200,
                method: request.method,
                url: request.url,
                headers: Vec::new(),
                body: String::new(),
            })
        });

    let config = PublishConfig {
        batches_url: "https://platform.test/batches".to_string(),
        ..PublishConfig::default()
    };
    let imported = HttpPublisher::new(transport, config, "tok")
        .import(9)
        .await
        .expect("imported");
    assert_eq!(imported, None);
}
