//! Version negotiation against a live HTTP server.
//!
//! Negotiation is blocking; tests run it in `spawn_blocking` and return only
//! plain data so no blocking client is dropped on the async runtime.

use maas_controller::{CandidateVersions, VersionInfo, VersionNegotiator};
use maas_core::client::RetryPolicy;
use maas_core::{Credentials, Error};
use std::fs;
use std::path::PathBuf;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Load a fixture from `tests/fixtures`.
fn fixture(name: &str) -> String {
    let fixture_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(&fixture_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read fixture at {}: {}",
            fixture_path.display(),
            e
        )
    })
}

/// Outcome of a negotiation, reduced to plain data.
#[derive(Debug)]
struct Negotiated {
    version: String,
    api_url: String,
    capabilities: Vec<String>,
}

async fn negotiate(base_url: String, candidates: &[&str]) -> Result<Negotiated, Error> {
    let candidates = CandidateVersions::new(candidates).unwrap();
    tokio::task::spawn_blocking(move || {
        VersionNegotiator::new(base_url, Credentials::keyed("ck", "tk", "secret"))
            .with_candidates(candidates)
            .with_retry_policy(RetryPolicy::immediate(1))
            .negotiate()
            .map(|client| Negotiated {
                version: client.api_version().to_string(),
                api_url: client.api_url().to_string(),
                capabilities: client.capabilities().iter().map(String::from).collect(),
            })
    })
    .await
    .unwrap()
}

async fn mount_version(server: &MockServer, version: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/MAAS/api/{version}/version/")))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_whoami(server: &MockServer, version: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/MAAS/api/{version}/users/")))
        .and(query_param("op", "whoami"))
        .and(header_exists("authorization"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

#[test]
fn test_fixture_parses_as_version_info() {
    let info = VersionInfo::from_slice(fixture("version.json").as_bytes()).unwrap();
    assert_eq!(info.version, "2.4.2");
    assert_eq!(info.capabilities.len(), 9);
    assert!(info.capabilities.contains("authenticate-api"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_walks_candidates_until_one_is_offered() {
    let server = MockServer::start().await;
    let version_doc = fixture("version.json");

    mount_version(&server, "2.0", ResponseTemplate::new(404), 1).await;
    mount_version(&server, "2.1", ResponseTemplate::new(404), 1).await;
    mount_version(
        &server,
        "2.3",
        ResponseTemplate::new(200).set_body_string(version_doc),
        1,
    )
    .await;
    mount_version(&server, "2.4", ResponseTemplate::new(200), 0).await;
    mount_whoami(
        &server,
        "2.3",
        ResponseTemplate::new(200).set_body_string(r#"{"username": "admin"}"#),
    )
    .await;

    let negotiated = negotiate(
        format!("{}/MAAS", server.uri()),
        &["2.0", "2.1", "2.3", "2.4"],
    )
    .await
    .unwrap();

    assert_eq!(negotiated.version, "2.3");
    assert_eq!(
        negotiated.api_url,
        format!("{}/MAAS/api/2.3/", server.uri())
    );
    assert!(negotiated
        .capabilities
        .iter()
        .any(|c| c == "devices-management"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_html_login_page_means_not_offered() {
    let server = MockServer::start().await;

    mount_version(
        &server,
        "2.0",
        ResponseTemplate::new(200)
            .set_body_string("<html><head><title>Login | MAAS</title></head><body></body></html>"),
        1,
    )
    .await;
    mount_version(
        &server,
        "2.1",
        ResponseTemplate::new(200).set_body_string(fixture("version.json")),
        1,
    )
    .await;
    let whoami = ResponseTemplate::new(200).set_body_string("{}");
    mount_whoami(&server, "2.1", whoami).await;

    let negotiated = negotiate(format!("{}/MAAS/", server.uri()), &["2.0", "2.1"])
        .await
        .unwrap();
    assert_eq!(negotiated.version, "2.1");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;

    mount_version(
        &server,
        "2.0",
        ResponseTemplate::new(200).set_body_string(fixture("version.json")),
        1,
    )
    .await;
    mount_whoami(
        &server,
        "2.0",
        ResponseTemplate::new(401).set_body_string("Expired timestamp"),
    )
    .await;
    mount_version(&server, "2.1", ResponseTemplate::new(200), 0).await;

    let err = negotiate(format!("{}/MAAS", server.uri()), &["2.0", "2.1"])
        .await
        .unwrap_err();
    assert!(err.is_permission(), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_outage_is_not_a_version_mismatch() {
    let server = MockServer::start().await;

    mount_version(&server, "2.0", ResponseTemplate::new(503), 2).await;
    mount_version(&server, "2.1", ResponseTemplate::new(200), 0).await;

    let err = negotiate(format!("{}/MAAS", server.uri()), &["2.0", "2.1"])
        .await
        .unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(503));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_candidate_offered() {
    let server = MockServer::start().await;

    mount_version(&server, "2.0", ResponseTemplate::new(404), 1).await;
    mount_version(&server, "2.1", ResponseTemplate::new(410), 1).await;

    let err = negotiate(format!("{}/MAAS", server.uri()), &["2.0", "2.1"])
        .await
        .unwrap_err();
    let Error::UnsupportedVersion(message) = err else {
        panic!("expected unsupported version, got {err:?}");
    };
    assert!(message.contains("[2.0, 2.1]"), "{message}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pinned_unknown_version_sends_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = negotiate(format!("{}/MAAS/api/3.0/", server.uri()), &["2.0"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedVersion(_)), "{err:?}");
}
