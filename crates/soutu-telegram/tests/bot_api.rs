//! Bot API client and file fetcher against a wiremock server

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use soutu_proxy::ProxyError;
use soutu_proxy::location::PathResolver;
use soutu_proxy::upstream::UpstreamFetcher;
use soutu_telegram::{TelegramClient, TelegramConfig, TelegramError};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123456:TEST-token";

fn client_for(server: &MockServer) -> TelegramClient {
    client_with(server, |c| c)
}

fn client_with(
    server: &MockServer,
    tweak: impl FnOnce(TelegramConfig) -> TelegramConfig,
) -> TelegramClient {
    let config = TelegramConfig::default()
        .with_api_base(server.uri())
        .with_bot_token(TOKEN);
    TelegramClient::new(tweak(config)).unwrap()
}

async fn mount_get_file(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getFile")))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_call_returns_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getFile")))
        .and(body_json(json!({ "file_id": "img_42" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {
                "file_id": "img_42",
                "file_unique_id": "AQADu",
                "file_size": 2048,
                "file_path": "photos/file_7.jpg"
            }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let file = client.get_file("img_42").await.unwrap();
    assert_eq!(file.file_path.as_deref(), Some("photos/file_7.jpg"));
    assert_eq!(file.file_size, Some(2048));

    assert_eq!(
        client.resolve_path("img_42").await.unwrap(),
        "photos/file_7.jpg"
    );
}

#[tokio::test]
async fn test_ok_false_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .call("sendMessage", &json!({ "chat_id": 1, "text": "hi" }))
        .await
        .unwrap_err();
    match err {
        TelegramError::Api {
            method,
            status,
            description,
            error_code,
        } => {
            assert_eq!(method, "sendMessage");
            assert_eq!(status, 200);
            assert_eq!(error_code, Some(403));
            assert_eq!(
                description.as_deref(),
                Some("Forbidden: bot was blocked by the user")
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getFile")))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_file("img_42")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TelegramError::Api {
            status: 502,
            description: None,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unknown_file_resolves_to_not_found() {
    let server = MockServer::start().await;
    mount_get_file(
        &server,
        400,
        json!({ "ok": false, "error_code": 400, "description": "Bad Request: invalid file_id" }),
    )
    .await;

    let err = client_for(&server)
        .resolve_path("bogus")
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::NotFound { .. }));
}

#[tokio::test]
async fn test_missing_file_path_resolves_to_not_found() {
    let server = MockServer::start().await;
    mount_get_file(
        &server,
        200,
        json!({ "ok": true, "result": { "file_id": "big", "file_size": 60_000_000 } }),
    )
    .await;

    let err = client_for(&server)
        .resolve_path("big")
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::NotFound { .. }));
}

#[tokio::test]
async fn test_server_error_is_upstream_unavailable() {
    let server = MockServer::start().await;
    mount_get_file(
        &server,
        500,
        json!({ "ok": false, "error_code": 500, "description": "Internal Server Error" }),
    )
    .await;

    let err = client_for(&server)
        .resolve_path("img_42")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::UpstreamUnavailable {
            status_code: Some(500),
            ..
        }
    ));
}

#[tokio::test]
async fn test_timeout_never_leaks_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": true, "result": {} }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = client_with(&server, |c| c.with_timeout(Duration::from_millis(100)));
    let err = client.get_file("img_42").await.unwrap_err();
    assert!(matches!(err, TelegramError::Transport { timed_out: true, .. }));
    assert!(!err.to_string().contains("TEST-token"));

    let proxy: ProxyError = err.into();
    assert!(!proxy.to_string().contains("TEST-token"));
}

#[tokio::test]
async fn test_mock_mode_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_with(&server, |c| c.with_mock(true));
    assert_eq!(
        client.resolve_path("img_42").await.unwrap(),
        "mock/file.jpg"
    );
}

#[tokio::test]
async fn test_fetch_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/file/bot{TOKEN}/photos/file_7.jpg")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"\xff\xd8\xffjpeg".to_vec()),
        )
        .mount(&server)
        .await;

    let fetcher = client_for(&server).file_fetcher();
    let response = fetcher.fetch("photos/file_7.jpg").await.unwrap();
    assert_eq!(response.status, http::StatusCode::OK);
    assert_eq!(response.headers["content-type"], "image/jpeg");
    assert_eq!(response.body.as_ref(), b"\xff\xd8\xffjpeg");
}

#[tokio::test]
async fn test_fetch_passes_through_failure_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let fetcher = client_for(&server).file_fetcher();
    let response = fetcher.fetch("photos/gone.jpg").await.unwrap();
    assert_eq!(response.status, http::StatusCode::NOT_FOUND);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_fetch_refuses_oversized_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let fetcher = client_with(&server, |c| c.with_max_body_bytes(1024)).file_fetcher();
    let err = fetcher.fetch("photos/huge.jpg").await.unwrap_err();
    assert!(matches!(err, ProxyError::UpstreamUnavailable { .. }));
}

#[tokio::test]
async fn test_fetch_without_token_is_configuration_error() {
    let fetcher = TelegramClient::new(TelegramConfig::default().with_mock(true))
        .unwrap()
        .file_fetcher();
    let err = fetcher.fetch("mock/file.jpg").await.unwrap_err();
    assert!(err.is_internal());
}
