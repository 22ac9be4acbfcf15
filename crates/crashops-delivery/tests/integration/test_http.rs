//! Integration tests for HttpTransport against a wiremock collector

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crashops_core::domain::DeliveryError;
use crashops_core::ports::IRemoteTransport;
use crashops_delivery::http::CLIENT_ID_HEADER;
use crashops_delivery::HttpTransport;

use crate::common::sample_report;

async fn setup() -> (MockServer, HttpTransport) {
    let server = MockServer::start().await;
    let transport = HttpTransport::with_base_url(server.uri(), Some("client-123".to_string()));
    (server, transport)
}

#[tokio::test]
async fn test_fatal_report_posted_to_crash_endpoint() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/storeCrashReport"))
        .and(header(CLIENT_ID_HEADER, "client-123"))
        .and(body_partial_json(json!({
            "title": "NullPointer",
            "details": { "screen": "checkout" },
            "delivered": false
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    transport
        .deliver(&sample_report("NullPointer"))
        .await
        .expect("deliver failed");
}

#[tokio::test]
async fn test_non_fatal_report_posted_to_error_endpoint() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/storeErrorReport"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let report = sample_report("SyncTimeout").with_fatal(false);
    transport.deliver(&report).await.expect("deliver failed");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/storeCrashReport"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = transport
        .deliver(&sample_report("NullPointer"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Transient(ref msg) if msg.contains("503")));
}

#[tokio::test]
async fn test_unreachable_collector_is_transient() {
    let transport = HttpTransport::with_base_url("http://127.0.0.1:1", Some("client-123".into()));

    let err = transport
        .deliver(&sample_report("NullPointer"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Transient(_)));
}

#[tokio::test]
async fn test_missing_client_id_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let transport = HttpTransport::with_base_url(server.uri(), None);
    let err = transport
        .deliver(&sample_report("NullPointer"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::NotConfigured(_)));

    let blank = HttpTransport::with_base_url(server.uri(), Some("   ".into()));
    assert!(blank.send_presence("{}").await.is_err());
}

#[tokio::test]
async fn test_presence_payload_forwarded() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/presence"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({ "app": "demo" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    transport
        .send_presence(r#"{"app":"demo","session_id":"abc"}"#)
        .await
        .expect("presence failed");
}
