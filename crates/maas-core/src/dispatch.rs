//! Request dispatch with bounded 503 retry.
//!
//! A [`Dispatcher`] signs a [`PreparedRequest`], sends it through a
//! [`Transport`], resends the same buffered body while the server answers
//! `503 Service Unavailable`, and classifies the final response into body bytes
//! or a [`DispatchError`].

use crate::auth::{Credentials, RequestSigner};
use crate::client::{ClientConfig, RetryPolicy, USER_AGENT};
use crate::error::{DispatchError, ServerError, TransportError};
use crate::{Error, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Result of one dispatch: the response body, or why there is none.
pub type DispatchOutcome = std::result::Result<Bytes, DispatchError>;

/// A fully-buffered request ready to be signed and sent.
///
/// The body is held in memory so it can be resent unchanged on retry.
#[derive(Debug)]
pub struct PreparedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl PreparedRequest {
    /// Create a request with an empty body and `Accept: application/json`.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Self {
            method,
            url,
            headers,
            body: Bytes::new(),
        }
    }

    /// Shorthand for a `GET` request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Set a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body from bytes already in memory.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Read a streaming body to the end and buffer it.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the reader fails.
    pub fn with_reader_body<R: Read>(mut self, mut reader: R) -> std::io::Result<Self> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        self.body = Bytes::from(buffer);
        Ok(self)
    }

    /// Encode parameters as an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn with_form(mut self, params: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = Bytes::from(encoded);
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute request URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers, used by signers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Buffered request body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }
}

/// A response whose body has been read to the end.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl RawResponse {
    /// Create a response.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// `Retry-After` in whole seconds, if the server sent one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

/// Sends a single request and returns the fully-read response.
///
/// Implementations must drain and release the response before returning, and
/// report any failure to obtain a complete response as a [`TransportError`].
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait Transport: Send + Sync {
    /// Send the request once.
    ///
    /// # Errors
    ///
    /// Returns a transport error when no complete HTTP response was obtained.
    fn send(&self, request: &PreparedRequest) -> std::result::Result<RawResponse, TransportError>;
}

/// Blocking HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Build the transport from client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the CA certificate cannot be loaded or
    /// the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .gzip(config.enable_compression);

        if !config.tls_verify {
            warn!("TLS verification disabled for MAAS client");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ca_cert) = &config.tls_ca_cert {
            debug!("loading MAAS CA certificate from {}", ca_cert.display());
            let bytes = std::fs::read(ca_cert).map_err(|err| {
                Error::ConfigError(format!(
                    "Failed to read MAAS CA certificate {}: {err}",
                    ca_cert.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&bytes)
                .map_err(|err| Error::ConfigError(format!("Invalid MAAS CA certificate: {err}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().map_err(|err| {
            Error::ConfigError(format!("Failed to build MAAS HTTP client: {err}"))
        })?;

        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &PreparedRequest) -> std::result::Result<RawResponse, TransportError> {
        let response = self
            .http
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .body(request.body().clone())
            .send()?;

        let status = response.status();
        let headers = response.headers().clone();
        // Consumes the response, returning the connection to the pool.
        let body = response.bytes()?;

        Ok(RawResponse::new(status, headers, body))
    }
}

/// Diagnostic request numbering shared by clones of one client.
#[derive(Debug, Default)]
pub struct RequestCounter(AtomicU64);

impl RequestCounter {
    /// Create a counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Take the next request id (starting at 1).
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Signs, sends and classifies requests.
///
/// Cloning is cheap; clones share the transport, signer and request counter.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    signer: Arc<dyn RequestSigner>,
    retry_policy: RetryPolicy,
    counter: Arc<RequestCounter>,
}

impl Dispatcher {
    /// Create a dispatcher with the default retry policy.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            transport,
            signer,
            retry_policy: RetryPolicy::new(),
            counter: Arc::new(RequestCounter::new()),
        }
    }

    /// Create a dispatcher over an [`HttpTransport`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be built.
    pub fn from_config(config: &ClientConfig, credentials: Credentials) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), Arc::new(credentials))
            .with_retry_policy(config.retry_policy))
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Use an existing request counter.
    #[must_use]
    pub fn with_counter(mut self, counter: Arc<RequestCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Active retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Request counter used for diagnostics.
    #[must_use]
    pub fn counter(&self) -> &Arc<RequestCounter> {
        &self.counter
    }

    /// Send the request, retrying on `503`, and classify the response.
    ///
    /// The request is sent at most `max_retries + 1` times. Only `503` is
    /// retried; every other failure status is returned on first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Transport`] when no response was obtained and
    /// [`DispatchError::Server`] for a final status `>= 400`.
    pub fn dispatch(&self, mut request: PreparedRequest) -> DispatchOutcome {
        let request_id = self.counter.next_id();
        let mut attempt = 0;

        loop {
            self.signer.sign(&mut request).map_err(|err| {
                DispatchError::Transport(TransportError::new(format!(
                    "failed to sign request: {err}"
                )))
            })?;

            debug!(
                request_id,
                method = %request.method(),
                url = %request.url(),
                attempt,
                "Sending MAAS request"
            );

            let response = self.transport.send(&request).map_err(|err| {
                warn!(request_id, url = %request.url(), "MAAS request failed: {err}");
                DispatchError::Transport(err)
            })?;

            if response.status() == StatusCode::SERVICE_UNAVAILABLE
                && attempt < self.retry_policy.max_retries
            {
                attempt += 1;
                let delay = self
                    .retry_policy
                    .delay_for_retry(attempt, response.retry_after());
                debug!(request_id, attempt, "Retrying MAAS request after {:?}", delay);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                continue;
            }

            return classify(request_id, response);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("signer", &self.signer)
            .field("retry_policy", &self.retry_policy)
            .field("requests", &self.counter.current())
            .finish_non_exhaustive()
    }
}

fn classify(request_id: u64, response: RawResponse) -> DispatchOutcome {
    let status = response.status();
    if status.as_u16() >= 400 {
        debug!(request_id, %status, "MAAS server error");
        let body = String::from_utf8_lossy(response.body()).into_owned();
        return Err(DispatchError::Server(ServerError::new(status, body)));
    }
    Ok(response.body)
}
