//! MAAS API version negotiation and version-bound client.
//!
//! A [`VersionNegotiator`] asks the region controller for an API version it
//! offers, checks the credentials, and hands back a [`BoundClient`] fixed to
//! that version and its advertised capabilities.
//!
//! ```no_run
//! let client = maas_controller::connect("http://maas.example:5240/MAAS", "ck:tk:secret")?;
//! println!("talking API {}", client.api_version());
//! # Ok::<(), maas_core::Error>(())
//! ```

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod negotiate;
pub mod version;

pub use client::{map_status_to_error, ApiClient};
pub use controller::BoundClient;
pub use negotiate::VersionNegotiator;
pub use version::{
    is_legacy_html_redirect, ApiVersion, CandidateVersions, Capabilities, VersionInfo,
    SUPPORTED_API_VERSIONS,
};

/// Convenient result alias that reuses the shared MAAS error type.
pub type Result<T> = maas_core::Result<T>;

/// Negotiate with a controller using default settings.
///
/// `api_key` is the `consumer:token:secret` triple from the MAAS UI; an empty
/// key connects anonymously.
///
/// # Errors
///
/// See [`VersionNegotiator::negotiate`]; a malformed key is
/// [`maas_core::Error::ConfigError`].
pub fn connect(base_url: &str, api_key: &str) -> Result<BoundClient> {
    let credentials = maas_core::Credentials::parse(api_key)?;
    VersionNegotiator::new(base_url, credentials).negotiate()
}
