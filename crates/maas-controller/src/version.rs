//! API versions, candidate lists and server capabilities.

use maas_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// API versions this client knows how to speak, most desirable first.
pub const SUPPORTED_API_VERSIONS: &[&str] = &["2.0"];

/// A `major.minor` API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    major: u32,
    minor: u32,
}

impl ApiVersion {
    /// Create a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Major component.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Minor component.
    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::ConfigError(format!("invalid API version {s:?}"));
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Ordered list of versions to try during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateVersions(Vec<ApiVersion>);

impl CandidateVersions {
    /// Parse candidates from version strings, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for an empty list or a malformed version.
    pub fn new<I, S>(versions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let versions = versions
            .into_iter()
            .map(|version| version.as_ref().parse())
            .collect::<Result<Vec<ApiVersion>>>()?;
        if versions.is_empty() {
            return Err(Error::ConfigError(
                "at least one candidate API version is required".to_string(),
            ));
        }
        Ok(Self(versions))
    }

    /// The built-in [`SUPPORTED_API_VERSIONS`].
    #[must_use]
    pub fn supported() -> Self {
        Self(
            SUPPORTED_API_VERSIONS
                .iter()
                .filter_map(|version| version.parse().ok())
                .collect(),
        )
    }

    /// Look up a version string among the candidates.
    #[must_use]
    pub fn find(&self, version: &str) -> Option<ApiVersion> {
        let version: ApiVersion = version.parse().ok()?;
        self.0.iter().copied().find(|candidate| *candidate == version)
    }

    /// Candidate at the given position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ApiVersion> {
        self.0.get(index).copied()
    }

    /// Iterate in preference order.
    pub fn iter(&self) -> impl Iterator<Item = ApiVersion> + '_ {
        self.0.iter().copied()
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for lists built through [`CandidateVersions::new`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CandidateVersions {
    fn default() -> Self {
        Self::supported()
    }
}

impl fmt::Display for CandidateVersions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let versions: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", versions.join(", "))
    }
}

/// Feature flags advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeSet<String>);

impl Capabilities {
    /// Returns true if the server advertises the capability.
    #[must_use]
    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    /// Iterate in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the server advertised nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Document returned by `GET {api}version/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Server release, e.g. `2.4.0`
    #[serde(default)]
    pub version: String,

    /// Server build identifier
    #[serde(default)]
    pub subversion: String,

    /// Advertised capabilities
    pub capabilities: Capabilities,
}

impl VersionInfo {
    /// Parse the body of `api/{version}/version/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deserialization`] if the body is not a version document.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|err| Error::Deserialization(format!("invalid version document: {err}")))
    }
}

/// Recognizes the HTML login page some MAAS releases serve instead of a 404
/// when an unauthenticated client requests an API version they do not offer.
///
/// Only this exact prefix at byte 0 counts; do not widen the match.
#[must_use]
pub fn is_legacy_html_redirect(body: &[u8]) -> bool {
    body.starts_with(b"<html><head")
}
