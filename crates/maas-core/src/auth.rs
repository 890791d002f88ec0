//! Credentials and request signing.
//!
//! MAAS API keys have the form `consumer_key:token_key:token_secret` and are
//! used with the OAuth 1.0a PLAINTEXT signature method. The consumer secret is
//! always empty, so the signature is `"&" + token_secret`.

use crate::dispatch::PreparedRequest;
use crate::{Error, Result};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;

const OAUTH_VERSION: &str = "1.0";
const SIGNATURE_METHOD: &str = "PLAINTEXT";
const KEY_FORMAT: &str = "<consumer key>:<token key>:<token secret>";

/// Adds authentication to a prepared request.
///
/// Implementations must not touch the method, URL or body, and must be safe to
/// call more than once on the same request: the dispatcher re-signs before
/// every retry.
pub trait RequestSigner: Send + Sync + fmt::Debug {
    /// Sign the request in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the authentication header cannot be built.
    fn sign(&self, request: &mut PreparedRequest) -> Result<()>;
}

/// OAuth token parsed from a MAAS API key.
#[derive(Clone)]
pub struct OAuthToken {
    consumer_key: String,
    token_key: String,
    token_secret: SecretString,
}

impl OAuthToken {
    /// Consumer key (first API key component).
    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Token key (second API key component).
    #[must_use]
    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    /// Build the `Authorization` header value for the given nonce and timestamp.
    #[must_use]
    pub fn authorization_header(&self, nonce: &str, timestamp: i64) -> String {
        let signature = format!("&{}", self.token_secret.expose_secret());
        let timestamp = timestamp.to_string();
        let fields = [
            ("realm", ""),
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_token", self.token_key.as_str()),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_signature", signature.as_str()),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_version", OAUTH_VERSION),
        ];

        let params: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("{key}=\"{}\"", encode(value)))
            .collect();
        format!("OAuth {}", params.join(", "))
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("consumer_key", &self.consumer_key)
            .field("token_key", &self.token_key)
            .field("token_secret", &"[REDACTED]")
            .finish()
    }
}

/// Credentials used to sign requests.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    /// No authentication header is sent
    #[default]
    Anonymous,
    /// OAuth 1.0a PLAINTEXT signing
    Keyed(OAuthToken),
}

impl Credentials {
    /// Build keyed credentials from the three API key components.
    #[must_use]
    pub fn keyed(
        consumer_key: impl Into<String>,
        token_key: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self::Keyed(OAuthToken {
            consumer_key: consumer_key.into(),
            token_key: token_key.into(),
            token_secret: SecretString::from(token_secret.into()),
        })
    }

    /// Parse a MAAS API key.
    ///
    /// An empty key means anonymous access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] unless the key has exactly three
    /// colon-separated components.
    pub fn parse(api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Ok(Self::Anonymous);
        }

        let parts: Vec<&str> = api_key.split(':').collect();
        match parts.as_slice() {
            [consumer_key, token_key, token_secret] => {
                Ok(Self::keyed(*consumer_key, *token_key, *token_secret))
            }
            _ => Err(Error::ConfigError(format!(
                "invalid API key: expected \"{KEY_FORMAT}\", got {} component(s)",
                parts.len()
            ))),
        }
    }

    /// Returns true for anonymous credentials.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl FromStr for Credentials {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl RequestSigner for Credentials {
    fn sign(&self, request: &mut PreparedRequest) -> Result<()> {
        let Self::Keyed(token) = self else {
            return Ok(());
        };

        let nonce = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let mut value = HeaderValue::from_str(&token.authorization_header(&nonce, timestamp))
            .map_err(|err| Error::ConfigError(format!("invalid OAuth header: {err}")))?;
        value.set_sensitive(true);

        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
