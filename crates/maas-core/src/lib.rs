//! # maas-core
//!
//! Core plumbing for talking to a MAAS region controller over its REST API.
//!
//! This crate provides the error taxonomy, HTTP client configuration, OAuth
//! PLAINTEXT request signing, and the retrying dispatcher that every resource
//! call goes through.
//!
//! ## Modules
//!
//! - [`error`] - Error types, server/transport failure classification
//! - [`client`] - HTTP client configuration and retry policy
//! - [`config`] - Validated client configuration document
//! - [`auth`] - Credentials and request signing
//! - [`endpoint`] - Base URL normalization and API version segments
//! - [`dispatch`] - Prepared requests, transports and the dispatcher

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod endpoint;
pub mod error;

// Re-export commonly used types
pub use auth::{Credentials, RequestSigner};
pub use dispatch::{DispatchOutcome, Dispatcher, PreparedRequest, RequestCounter, Transport};
pub use error::{DispatchError, Error, Result, ServerError, TransportError};
