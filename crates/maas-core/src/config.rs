//! Configuration for MAAS clients.
//!
//! [`MaasClientConfig`] is the serializable, validated description of how to
//! reach a MAAS region controller: where it is, which API key to use, and the
//! transport limits to apply.

use crate::auth::Credentials;
use crate::client::{ClientConfig, RetryPolicy, DEFAULT_RETRY_DELAY_MS};
use crate::endpoint::{add_api_version_to_url, ensure_trailing_slash, split_versioned_url};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Configuration for a MAAS client instance.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct MaasClientConfig {
    /// MAAS base URL, e.g. `http://maas.example:5240/MAAS/`
    #[validate(url)]
    pub base_url: String,

    /// API key in `consumer_key:token_key:token_secret` form (anonymous if absent)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Pin a specific API version instead of negotiating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to custom CA certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<std::path::PathBuf>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of retries after a 503 response
    #[validate(range(max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds
    #[validate(range(max = 60_000))]
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl MaasClientConfig {
    /// Create a new client configuration with required parameters.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The MAAS base URL (e.g., "http://maas.example:5240/MAAS")
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            base_url: base_url.into(),
            api_key: None,
            api_version: None,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        };

        config.check()?;
        Ok(config)
    }

    /// Parse a configuration document from JSON and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration document: {e}")))?;
        config.check()?;
        Ok(config)
    }

    /// Validate field ranges and URL syntax.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first invalid field.
    pub fn check(&self) -> Result<(), Error> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))
    }

    /// Set the API key used for authentication.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Pin the API version.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set custom CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: std::path::PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set maximum retry attempts.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial retry delay in milliseconds.
    #[must_use]
    pub const fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse the configured API key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the key is malformed.
    pub fn credentials(&self) -> Result<Credentials, Error> {
        self.api_key
            .as_deref()
            .map_or(Ok(Credentials::Anonymous), Credentials::parse)
    }

    /// The URL negotiation should start from.
    ///
    /// With a pinned `api_version` this is the versioned API URL; otherwise the
    /// base URL with a trailing slash. A `base_url` that already ends in
    /// `api/{x.y}` is kept as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if `base_url` embeds a version other than
    /// `api_version`, or if the resulting URL cannot be parsed.
    pub fn api_url(&self) -> Result<Url, Error> {
        let url = match (&self.api_version, split_versioned_url(&self.base_url)) {
            (Some(pinned), Some((_, embedded))) if *pinned != embedded => {
                return Err(Error::ConfigError(format!(
                    "base_url pins API version {embedded} but api_version is {pinned}"
                )));
            }
            (_, Some(_)) | (None, None) => ensure_trailing_slash(&self.base_url),
            (Some(version), None) => add_api_version_to_url(&self.base_url, version),
        };
        Url::parse(&url).map_err(|e| Error::ConfigError(format!("Invalid MAAS URL: {e}")))
    }

    /// HTTP transport settings derived from this configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let retry_policy = RetryPolicy::new()
            .with_max_retries(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.retry_delay_ms));

        let mut config = ClientConfig::new()
            .with_timeout(self.timeout())
            .with_retry_policy(retry_policy)
            .with_tls_verify(self.tls_verify);
        if let Some(ca_cert) = &self.tls_ca_cert {
            config = config.with_ca_cert(ca_cert.clone());
        }
        config
    }
}

impl fmt::Debug for MaasClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaasClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_version", &self.api_version)
            .field("tls_verify", &self.tls_verify)
            .field("tls_ca_cert", &self.tls_ca_cert)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl Default for MaasClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5240/MAAS/".to_string(),
            api_key: None,
            api_version: None,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}
