//! Version-bound client handed out by negotiation.

use crate::client::{map_status_to_error, ApiClient};
use crate::version::{ApiVersion, Capabilities};
use maas_core::{Error, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

/// A client fixed to one negotiated API version and capability set.
///
/// Produced by [`VersionNegotiator::negotiate`](crate::VersionNegotiator::negotiate).
/// Its version and capabilities never change; clones share them.
#[derive(Debug, Clone)]
pub struct BoundClient {
    client: ApiClient,
    version: ApiVersion,
    capabilities: Arc<Capabilities>,
}

impl BoundClient {
    pub(crate) fn new(client: ApiClient, version: ApiVersion, capabilities: Capabilities) -> Self {
        Self {
            client,
            version,
            capabilities: Arc::new(capabilities),
        }
    }

    /// Negotiated API version.
    #[must_use]
    pub const fn api_version(&self) -> ApiVersion {
        self.version
    }

    /// Capabilities advertised by the server.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns true if the server advertised the capability.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Versioned API URL.
    #[must_use]
    pub const fn api_url(&self) -> &Url {
        self.client.api_url()
    }

    /// Underlying versioned client for raw requests.
    #[must_use]
    pub const fn client(&self) -> &ApiClient {
        &self.client
    }

    /// `GET` a resource and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Server errors are classified by [`map_status_to_error`]; an undecodable
    /// body is [`Error::Deserialization`].
    pub fn get_json<T>(&self, path: &str, op: Option<&str>, params: &[(&str, &str)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = self
            .client
            .get(path, op, params)
            .map_err(map_status_to_error)?;
        decode(path, &body)
    }

    /// `POST` a form to a resource and decode the JSON body.
    ///
    /// # Errors
    ///
    /// See [`BoundClient::get_json`].
    pub fn post_json<T>(&self, path: &str, op: Option<&str>, params: &[(&str, &str)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = self
            .client
            .post(path, op, params)
            .map_err(map_status_to_error)?;
        decode(path, &body)
    }

    /// `PUT` a form to a resource and decode the JSON body.
    ///
    /// # Errors
    ///
    /// See [`BoundClient::get_json`].
    pub fn put_json<T>(&self, path: &str, params: &[(&str, &str)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = self
            .client
            .put(path, params)
            .map_err(map_status_to_error)?;
        decode(path, &body)
    }

    /// `DELETE` a resource.
    ///
    /// # Errors
    ///
    /// Server errors are classified by [`map_status_to_error`].
    pub fn delete(&self, path: &str) -> Result<()> {
        self.client
            .delete(path)
            .map(|_| ())
            .map_err(map_status_to_error)
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| {
        Error::Deserialization(format!("Failed to parse MAAS response for `{path}`: {err}"))
    })
}
