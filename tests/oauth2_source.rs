use apibridge::errors::ToolErrorKind;
use apibridge::services::auth::{CredentialManager, OAuth2Config, OAuth2TokenSource, TokenSource};
use apibridge::services::logger::Logger;
use apibridge::services::transport::ReqwestTransport;
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn source(token_url: String) -> OAuth2TokenSource {
    let transport = ReqwestTransport::new(Duration::from_secs(5), 64 * 1024, Logger::new("test"))
        .expect("client builds");
    let mut config = OAuth2Config::client_credentials(&token_url, "client-1", "s3cret");
    config.scope = Some("https://graph.example.com/.default".to_string());
    OAuth2TokenSource::new(config, Arc::new(transport))
}

#[tokio::test]
async fn client_credentials_exchange_returns_expiring_credential() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/tenant/oauth2/v2.0/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body_contains("grant_type=client_credentials")
            .body_contains("client_id=client-1")
            .body_contains("client_secret=s3cret");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"access_token":"abc.def","token_type":"Bearer","expires_in":3600,"scope":"Mail.Read Chat.Read"}"#);
    });

    let credential = source(server.url("/tenant/oauth2/v2.0/token"))
        .exchange()
        .await
        .expect("exchange succeeds");

    mock.assert();
    assert_eq!(credential.access_token, "abc.def");
    assert_eq!(credential.bearer(), "Bearer abc.def");
    let expires_at = credential.expires_at.expect("expiry parsed");
    let remaining = expires_at - chrono::Utc::now();
    assert!(remaining > chrono::Duration::seconds(3500));
    assert_eq!(credential.scopes, vec!["Mail.Read", "Chat.Read"]);
}

#[tokio::test]
async fn oversized_expires_in_yields_a_usable_credential() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"access_token":"x","expires_in":9223372036854775807}"#);
    });

    let auth = CredentialManager::new(
        Arc::new(source(server.url("/token"))),
        Duration::from_secs(60),
        Logger::new("test"),
    );
    let credential = auth.acquire().await.expect("credential acquired");
    assert_eq!(credential.access_token, "x");
    assert!(credential.expires_at.expect("expiry clamped") > chrono::Utc::now());
}

#[tokio::test]
async fn token_endpoint_rejection_is_an_authentication_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(400)
            .header("content-type", "application/json")
            .body(r#"{"error":"invalid_client","error_description":"bad secret"}"#);
    });

    let err = source(server.url("/token")).exchange().await.unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::Authentication);
    assert_eq!(err.status, Some(400));
    assert!(err.details.unwrap()["body"]
        .as_str()
        .unwrap()
        .contains("invalid_client"));
}

#[tokio::test]
async fn response_without_token_is_an_authentication_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"token_type":"Bearer"}"#);
    });

    let err = source(server.url("/token")).exchange().await.unwrap_err();
    assert_eq!(err.kind, ToolErrorKind::Authentication);
}

#[tokio::test]
async fn credential_manager_hits_token_endpoint_once_for_concurrent_callers() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .header("content-type", "application/json")
            .delay(Duration::from_millis(50))
            .body(r#"{"access_token":"shared","expires_in":3600}"#);
    });

    let manager = Arc::new(CredentialManager::new(
        Arc::new(source(server.url("/token"))),
        Duration::from_secs(60),
        Logger::new("test"),
    ));
    let waiters = (0..10).map(|_| {
        let manager = manager.clone();
        async move { manager.acquire().await }
    });
    for credential in futures::future::join_all(waiters).await {
        assert_eq!(credential.expect("acquire succeeds").access_token, "shared");
    }

    mock.assert_hits(1);
    assert_eq!(manager.exchange_count(), 1);
}
