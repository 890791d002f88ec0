//! Dispatcher behaviour against a live HTTP server.
//!
//! The dispatcher is blocking, so each test drives it from `spawn_blocking`
//! and only hands plain data back to the async side.

use maas_core::client::{ClientConfig, RetryPolicy};
use maas_core::{Credentials, Dispatcher, Error, PreparedRequest};
use reqwest::Method;
use url::Url;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FORM: &str = "hostname=node-1&arch=amd64%2Fgeneric";

fn dispatcher(retries: u32) -> Dispatcher {
    let config = ClientConfig::new().with_retry_policy(RetryPolicy::immediate(retries));
    Dispatcher::from_config(&config, Credentials::keyed("ck", "tk", "secret")).unwrap()
}

/// Dispatch a form POST and return the body or the error.
async fn post(uri: String, retries: u32) -> Result<Vec<u8>, Error> {
    tokio::task::spawn_blocking(move || {
        let url = Url::parse(&format!("{uri}/MAAS/api/2.0/machines/")).unwrap();
        let request = PreparedRequest::new(Method::POST, url)
            .with_form(&[("hostname", "node-1"), ("arch", "amd64/generic")]);
        dispatcher(retries)
            .dispatch(request)
            .map(|body| body.to_vec())
            .map_err(Error::from)
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retries_service_unavailable_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/MAAS/api/2.0/machines/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/MAAS/api/2.0/machines/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"system_id": "4y3h7n"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let body = post(server.uri(), 3).await.unwrap();
    assert_eq!(body, br#"{"system_id": "4y3h7n"}"#);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
    for request in &requests {
        assert_eq!(request.body, FORM.as_bytes());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/MAAS/api/2.0/machines/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("region starting"))
        .expect(4)
        .mount(&server)
        .await;

    let err = post(server.uri(), 3).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
    assert_eq!(err.server_error().unwrap().body(), "region starting");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_success_is_sent_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/MAAS/api/2.0/machines/"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let body = post(server.uri(), 3).await.unwrap();
    assert_eq!(body, b"{}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_other_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/MAAS/api/2.0/machines/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("traceback"))
        .expect(1)
        .mount(&server)
        .await;

    let err = post(server.uri(), 3).await.unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(500));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_signature_carries_token_secret() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/MAAS/api/2.0/machines/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    post(server.uri(), 0).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let authorization = requests[0]
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(authorization.starts_with("OAuth "), "{authorization}");
    assert!(authorization.contains(r#"oauth_signature_method="PLAINTEXT""#));
    assert!(authorization.contains(r#"oauth_signature="%26secret""#));
    assert!(authorization.contains(r#"oauth_consumer_key="ck""#));
    assert!(authorization.contains(r#"oauth_token="tk""#));
}
