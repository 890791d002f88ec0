//! API version negotiation.
//!
//! Before any resource call, the client has to find an API version the server
//! offers. [`VersionNegotiator`] requests `{base}api/{version}/version/` for each
//! candidate, most desirable first, and treats only `404`, `410` and the legacy
//! HTML login redirect as "not offered". Anything else stops negotiation and is
//! returned as-is, so an outage is never reported as a protocol mismatch.
//!
//! Once a version answers, `users/?op=whoami` checks the credentials; a `401`
//! or `403` there is a [`Error::Permission`] and also stops negotiation, since
//! bad credentials are bad for every version.

use crate::client::ApiClient;
use crate::controller::BoundClient;
use crate::version::{is_legacy_html_redirect, ApiVersion, CandidateVersions, VersionInfo};
use maas_core::client::{ClientConfig, RetryPolicy};
use maas_core::config::MaasClientConfig;
use maas_core::endpoint::{add_api_version_to_url, ensure_trailing_slash, split_versioned_url};
use maas_core::{Credentials, Dispatcher, Error, RequestCounter, Result, Transport};
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

enum NegotiationState {
    TryingVersion(usize),
    Success(BoundClient),
    Exhausted,
    Fatal(Error),
}

enum Outcome {
    Bound(BoundClient),
    NotOffered,
}

/// Finds an API version the server supports and returns a [`BoundClient`].
///
/// Negotiation keeps no state between runs: every call to
/// [`negotiate`](Self::negotiate) starts again from the first candidate.
pub struct VersionNegotiator {
    base_url: String,
    credentials: Credentials,
    candidates: CandidateVersions,
    http_config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    counter: Arc<RequestCounter>,
}

impl VersionNegotiator {
    /// Create a negotiator for a base URL, which may already contain an
    /// `api/{version}` segment.
    #[must_use]
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            candidates: CandidateVersions::supported(),
            http_config: ClientConfig::new(),
            transport: None,
            counter: Arc::new(RequestCounter::new()),
        }
    }

    /// Create a negotiator from a client configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for invalid settings or a malformed API
    /// key; no request is made in that case.
    pub fn from_config(config: &MaasClientConfig) -> Result<Self> {
        config.check()?;
        let credentials = config.credentials()?;
        let base_url = config.api_url()?;
        Ok(Self::new(base_url.as_str(), credentials)
            .with_http_config(config.client_config()))
    }

    /// Override the candidate versions.
    #[must_use]
    pub fn with_candidates(mut self, candidates: CandidateVersions) -> Self {
        self.candidates = candidates;
        self
    }

    /// Override the HTTP transport settings.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Override the 503 retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.http_config.retry_policy = policy;
        self
    }

    /// Send requests through a custom transport instead of `reqwest`.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share a request counter with the produced clients.
    #[must_use]
    pub fn with_counter(mut self, counter: Arc<RequestCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Candidate versions in preference order.
    #[must_use]
    pub const fn candidates(&self) -> &CandidateVersions {
        &self.candidates
    }

    /// Run negotiation.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedVersion`] if a pinned version is unknown or not
    ///   offered, or if no candidate is offered;
    /// - [`Error::Permission`] if the credentials are rejected;
    /// - [`Error::Transport`], [`Error::Server`] or [`Error::Deserialization`]
    ///   for any other failure, unchanged.
    pub fn negotiate(&self) -> Result<BoundClient> {
        if let Some((base, version)) = split_versioned_url(&self.base_url) {
            return self.negotiate_pinned(&base, &version);
        }

        let base = ensure_trailing_slash(&self.base_url);
        let dispatcher = self.dispatcher()?;
        let mut state = NegotiationState::TryingVersion(0);

        loop {
            state = match state {
                NegotiationState::TryingVersion(index) => {
                    self.try_candidate(&dispatcher, &base, index)
                }
                NegotiationState::Success(client) => {
                    info!(
                        version = %client.api_version(),
                        capabilities = client.capabilities().len(),
                        "Negotiated MAAS API version"
                    );
                    return Ok(client);
                }
                NegotiationState::Exhausted => {
                    return Err(Error::UnsupportedVersion(format!(
                        "controller at {base} does not support any of {}",
                        self.candidates
                    )));
                }
                NegotiationState::Fatal(err) => return Err(err),
            };
        }
    }

    fn try_candidate(
        &self,
        dispatcher: &Dispatcher,
        base: &str,
        index: usize,
    ) -> NegotiationState {
        let Some(version) = self.candidates.get(index) else {
            return NegotiationState::Exhausted;
        };

        match query_version(dispatcher, base, version) {
            Ok(Outcome::Bound(client)) => NegotiationState::Success(client),
            Ok(Outcome::NotOffered) => {
                debug!(%version, "MAAS API version not offered, trying next candidate");
                NegotiationState::TryingVersion(index + 1)
            }
            Err(err) => NegotiationState::Fatal(err),
        }
    }

    fn negotiate_pinned(&self, base: &str, version: &str) -> Result<BoundClient> {
        let Some(version) = self.candidates.find(version) else {
            return Err(Error::UnsupportedVersion(format!(
                "version {version} is not one of {}",
                self.candidates
            )));
        };

        let dispatcher = self.dispatcher()?;
        match query_version(&dispatcher, base, version)? {
            Outcome::Bound(client) => {
                info!(version = %version, "Using pinned MAAS API version");
                Ok(client)
            }
            Outcome::NotOffered => Err(Error::UnsupportedVersion(format!(
                "controller at {base} does not offer version {version}"
            ))),
        }
    }

    fn dispatcher(&self) -> Result<Dispatcher> {
        let dispatcher = match &self.transport {
            Some(transport) => {
                Dispatcher::new(Arc::clone(transport), Arc::new(self.credentials.clone()))
                    .with_retry_policy(self.http_config.retry_policy)
            }
            None => Dispatcher::from_config(&self.http_config, self.credentials.clone())?,
        };
        Ok(dispatcher.with_counter(Arc::clone(&self.counter)))
    }
}

impl fmt::Debug for VersionNegotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionNegotiator")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("candidates", &self.candidates)
            .field("http_config", &self.http_config)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

fn query_version(dispatcher: &Dispatcher, base: &str, version: ApiVersion) -> Result<Outcome> {
    let api_url = add_api_version_to_url(base, &version.to_string());
    let client = ApiClient::new(&api_url, dispatcher.clone())?;

    let Some(info) = read_version_info(&client)? else {
        return Ok(Outcome::NotOffered);
    };
    check_credentials(&client)?;

    let bound = BoundClient::new(client, version, info.capabilities);
    Ok(Outcome::Bound(bound))
}

/// `None` when the server does not offer this version.
fn read_version_info(client: &ApiClient) -> Result<Option<VersionInfo>> {
    let body = match client.get("version/", None, &[]) {
        Ok(body) => body,
        Err(Error::Server(err))
            if matches!(err.status(), StatusCode::NOT_FOUND | StatusCode::GONE) =>
        {
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    match VersionInfo::from_slice(&body) {
        Ok(info) => Ok(Some(info)),
        Err(_) if is_legacy_html_redirect(&body) => Ok(None),
        Err(err) => Err(err),
    }
}

fn check_credentials(client: &ApiClient) -> Result<()> {
    match client.get("users/", Some("whoami"), &[]) {
        Ok(_) => Ok(()),
        Err(Error::Server(err))
            if matches!(err.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
        {
            Err(Error::Permission(format!(
                "credentials rejected by {}: {}",
                client.api_url(),
                err.body()
            )))
        }
        Err(err) => Err(err),
    }
}
