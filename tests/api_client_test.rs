use anyhow::Result;
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;
use tracker_provisioner::core::registration::{self, DEFAULT_REGISTRATION_TIMEOUT};
use tracker_provisioner::domain::model::RegistrationOutcome;
use tracker_provisioner::domain::ports::{ApiGateway, SmsTransport};
use tracker_provisioner::{ApiClient, CommandCatalog, HttpSmsGateway, ProvisionError, TrackerDetails};

fn client(server: &MockServer) -> Result<ApiClient> {
    Ok(ApiClient::new(&server.url("/api"), "secret-key")?
        .with_timeout(Duration::from_millis(500))
        .with_retry(2, Duration::from_millis(10)))
}

/// 註冊請求帶 API key 與追蹤器內容，409 仍視為可繼續
#[tokio::test]
async fn test_registration_sends_api_key_and_body() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/trackers")
                .header("X-API-Key", "secret-key")
                .json_body(json!({
                    "id": "123456789012",
                    "name": "Van 7",
                    "phoneNumber": "+4587654321",
                    "model": "D21L",
                    "enabled": true
                }));
            then.status(409);
        })
        .await;

    let api = client(&server)?;
    let details = TrackerDetails::new("123456789012", "Van 7", "+45 8765 4321", "D21L")?;
    let outcome = registration::register(&api, &details, DEFAULT_REGISTRATION_TIMEOUT).await?;

    mock.assert_async().await;
    assert_eq!(outcome, RegistrationOutcome::DuplicateOwn);
    Ok(())
}

/// 用戶端請求逾時早於註冊期限時，仍回報為可重試的註冊逾時
#[tokio::test]
async fn test_client_timeout_during_registration_is_retriable() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/trackers");
            then.status(201).delay(Duration::from_secs(2));
        })
        .await;

    let api = ApiClient::new(&server.url("/api"), "secret-key")?
        .with_timeout(Duration::from_millis(100))
        .with_retry(0, Duration::from_millis(10));
    let details = TrackerDetails::new("123456789012", "Van 7", "87654321", "D21L")?;

    let err = registration::register(&api, &details, Duration::from_secs(5))
        .await
        .expect_err("a server that never answers must time out");

    assert!(matches!(err, ProvisionError::RegistrationTimeout { .. }));
    assert!(err.is_retriable());
    Ok(())
}

#[tokio::test]
async fn test_server_errors_are_retried() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/models");
            then.status(503);
        })
        .await;

    let api = client(&server)?;
    let response = api.get("models").await?;

    assert_eq!(response.status_code, 503);
    mock.assert_hits_async(3).await;
    Ok(())
}

#[tokio::test]
async fn test_client_errors_are_not_retried() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/trackers/123456789012");
            then.status(404);
        })
        .await;

    let api = client(&server)?;
    let response = api.get("trackers/123456789012").await?;

    assert_eq!(response.status_code, 404);
    assert!(response.body.is_none());
    mock.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn test_whoami_falls_back_to_unknown() -> Result<()> {
    let server = MockServer::start_async().await;
    let mut named = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/whoami");
            then.status(200).json_body(json!({"name": "Fleet Ops"}));
        })
        .await;

    let api = client(&server)?;
    assert_eq!(api.whoami().await?, "Fleet Ops");

    named.delete_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/whoami");
            then.status(200).json_body(json!({}));
        })
        .await;
    assert_eq!(api.whoami().await?, "Unknown");
    Ok(())
}

#[tokio::test]
async fn test_fetch_models_from_backend() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/models");
            then.status(200).json_body(json!([
                {"Name": "D21L", "Init_commands": "APN,internet#;SERVER,1,host,5013#;", "Success_keywords": "APN OK;SERVER OK"},
                {"Name": "Broken", "Init_commands": "A;;B", "Success_keywords": "a;b;c"}
            ]));
        })
        .await;

    let api = client(&server)?;
    let catalog = CommandCatalog::fetch(&api).await?;

    assert_eq!(catalog.model_names(), vec!["D21L"]);
    assert_eq!(catalog.lookup("D21L")?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_sms_gateway_posts_with_bearer_token() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/sms")
                .header("Authorization", "Bearer sms-token")
                .json_body(json!({"to": "87654321", "text": "APN,internet#"}));
            then.status(202);
        })
        .await;

    let gateway = HttpSmsGateway::new(&server.url("/sms"), Some("sms-token".to_string()))?;
    gateway.check_permission()?;
    gateway.send("87654321", "APN,internet#").await?;

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_sms_gateway_rejection_is_transport_error() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/sms");
            then.status(500);
        })
        .await;

    let gateway = HttpSmsGateway::new(&server.url("/sms"), Some("sms-token".to_string()))?;
    let result = gateway.send("87654321", "APN,internet#").await;

    assert!(matches!(result, Err(ProvisionError::SmsTransportError { .. })));
    Ok(())
}
