//! Versioned MAAS API client.

use bytes::Bytes;
use maas_core::endpoint::ensure_trailing_slash;
use maas_core::{Dispatcher, Error, PreparedRequest, Result};
use reqwest::{Method, StatusCode};
use url::Url;

/// Client pointed at one `{base}api/{version}/` URL.
///
/// Paths passed to the request methods are resolved against the API URL, so
/// both relative paths (`machines/`) and the absolute resource URIs MAAS hands
/// out (`/MAAS/api/2.0/machines/abc/`) work.
#[derive(Debug, Clone)]
pub struct ApiClient {
    api_url: Url,
    dispatcher: Dispatcher,
}

impl ApiClient {
    /// Create a client for a versioned API URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the URL cannot be parsed.
    pub fn new(api_url: &str, dispatcher: Dispatcher) -> Result<Self> {
        let api_url = Url::parse(&ensure_trailing_slash(api_url)).map_err(|err| {
            Error::InvalidEndpoint(format!("Invalid MAAS API URL `{api_url}`: {err}"))
        })?;
        Ok(Self {
            api_url,
            dispatcher,
        })
    }

    /// The versioned API URL, always with a trailing slash.
    #[must_use]
    pub const fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Dispatcher used for every request.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Resolve a path against the API URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the path cannot be joined.
    pub fn get_url(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|err| Error::InvalidEndpoint(format!("Invalid MAAS path `{path}`: {err}")))
    }

    /// Send a prepared request through the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] or [`Error::Server`] as classified by the
    /// dispatcher.
    pub fn dispatch(&self, request: PreparedRequest) -> Result<Bytes> {
        Ok(self.dispatcher.dispatch(request)?)
    }

    /// `GET path?op=...&params...`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::dispatch`].
    pub fn get(&self, path: &str, op: Option<&str>, params: &[(&str, &str)]) -> Result<Bytes> {
        let url = self.build_url(path, op, params)?;
        self.dispatch(PreparedRequest::get(url))
    }

    /// `POST path?op=...` with the parameters as a form body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::dispatch`].
    pub fn post(&self, path: &str, op: Option<&str>, params: &[(&str, &str)]) -> Result<Bytes> {
        let url = self.build_url(path, op, &[])?;
        self.dispatch(PreparedRequest::new(Method::POST, url).with_form(params))
    }

    /// `PUT path` with the parameters as a form body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::dispatch`].
    pub fn put(&self, path: &str, params: &[(&str, &str)]) -> Result<Bytes> {
        let url = self.get_url(path)?;
        self.dispatch(PreparedRequest::new(Method::PUT, url).with_form(params))
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::dispatch`].
    pub fn delete(&self, path: &str) -> Result<Bytes> {
        let url = self.get_url(path)?;
        self.dispatch(PreparedRequest::new(Method::DELETE, url))
    }

    fn build_url(&self, path: &str, op: Option<&str>, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.get_url(path)?;
        if op.is_some() || !params.is_empty() {
            let mut query = url.query_pairs_mut();
            if let Some(op) = op {
                query.append_pair("op", op);
            }
            query.extend_pairs(params);
        }
        Ok(url)
    }
}

/// Classify a failed resource call for callers.
///
/// Server errors with a well-known meaning become dedicated variants; any other
/// status, and transport failures, pass through unchanged.
#[must_use]
pub fn map_status_to_error(err: Error) -> Error {
    let Error::Server(server) = err else {
        return err;
    };
    let text = server.body().to_string();
    match server.status() {
        StatusCode::BAD_REQUEST => Error::BadRequest(text),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Permission(text),
        StatusCode::NOT_FOUND => Error::NoMatch(text),
        StatusCode::CONFLICT => Error::CannotComplete(text),
        _ => Error::Server(server),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maas_core::client::RetryPolicy;
    use maas_core::dispatch::{MockTransport, RawResponse};
    use maas_core::{Credentials, ServerError, TransportError};
    use mockall::Sequence;
    use reqwest::header::HeaderMap;
    use std::sync::Arc;

    const API: &str = "http://maas.example/MAAS/api/2.0/";

    type Reply = std::result::Result<RawResponse, TransportError>;

    fn reply(status: u16, body: &'static str) -> Reply {
        Ok(RawResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body,
        ))
    }

    /// Path and query of the request URL.
    fn target(request: &PreparedRequest) -> String {
        let url = request.url();
        match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        }
    }

    fn client(transport: MockTransport) -> ApiClient {
        let dispatcher = Dispatcher::new(Arc::new(transport), Arc::new(Credentials::Anonymous))
            .with_retry_policy(RetryPolicy::immediate(3));
        ApiClient::new(API, dispatcher).unwrap()
    }

    #[test]
    fn test_api_url_gets_trailing_slash() {
        let dispatcher = Dispatcher::new(
            Arc::new(MockTransport::new()),
            Arc::new(Credentials::Anonymous),
        );
        let client = ApiClient::new("http://maas.example/MAAS/api/2.0", dispatcher).unwrap();
        assert_eq!(client.api_url().as_str(), API);
    }

    #[test]
    fn test_invalid_api_url() {
        let dispatcher = Dispatcher::new(
            Arc::new(MockTransport::new()),
            Arc::new(Credentials::Anonymous),
        );
        let err = ApiClient::new("::not a url", dispatcher).unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint(_)));
    }

    #[test]
    fn test_get_url_relative_and_absolute() {
        let client = client(MockTransport::new());

        assert_eq!(
            client.get_url("machines/").unwrap().as_str(),
            "http://maas.example/MAAS/api/2.0/machines/"
        );
        assert_eq!(
            client.get_url("/MAAS/api/2.0/nodes/4y3h7n/").unwrap().as_str(),
            "http://maas.example/MAAS/api/2.0/nodes/4y3h7n/"
        );
    }

    #[test]
    fn test_get_with_op_and_params() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|request| {
                *request.method() == Method::GET
                    && target(request) == "/MAAS/api/2.0/machines/?op=list&hostname=node+1"
                    && request.body().is_empty()
            })
            .times(1)
            .returning(|_| reply(200, "[]"));

        let body = client(transport)
            .get("machines/", Some("list"), &[("hostname", "node 1")])
            .unwrap();
        assert_eq!(body.as_ref(), b"[]");
    }

    #[test]
    fn test_post_sends_op_in_query_and_params_in_body() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|request| {
                *request.method() == Method::POST
                    && target(request) == "/MAAS/api/2.0/machines/?op=allocate"
                    && request.body().as_ref() == b"arch=amd64&mem=2048"
            })
            .times(1)
            .returning(|_| reply(200, "{}"));

        let params = [("arch", "amd64"), ("mem", "2048")];
        client(transport)
            .post("machines/", Some("allocate"), &params)
            .unwrap();
    }

    #[test]
    fn test_put_and_delete() {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .withf(|request| {
                *request.method() == Method::PUT
                    && target(request) == "/MAAS/api/2.0/tags/virtual/"
                    && request.body().as_ref() == b"comment=vm"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(200, "{}"));
        transport
            .expect_send()
            .withf(|request| {
                *request.method() == Method::DELETE
                    && target(request) == "/MAAS/api/2.0/tags/virtual/"
                    && request.body().is_empty()
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply(204, ""));

        let client = client(transport);
        client.put("tags/virtual/", &[("comment", "vm")]).unwrap();
        client.delete("tags/virtual/").unwrap();
    }

    #[test]
    fn test_dispatch_errors_keep_their_kind() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|request| request.url().path() == "/MAAS/api/2.0/down/")
            .times(1)
            .returning(|_| Err(TransportError::new("connection refused")));
        transport
            .expect_send()
            .withf(|request| request.url().path() == "/MAAS/api/2.0/broken/")
            .times(1)
            .returning(|_| reply(500, "oops"));

        let client = client(transport);
        assert!(matches!(
            client.get("down/", None, &[]),
            Err(Error::Transport(_))
        ));
        assert_eq!(
            client.get("broken/", None, &[]).unwrap_err(),
            Error::Server(ServerError::new(StatusCode::INTERNAL_SERVER_ERROR, "oops"))
        );
    }

    #[test]
    fn test_service_unavailable_is_retried_through_dispatcher() {
        let mut transport = MockTransport::new();
        let mut calls = 0;
        transport
            .expect_send()
            .withf(|request| target(request) == "/MAAS/api/2.0/zones/")
            .times(3)
            .returning(move |_| {
                calls += 1;
                if calls < 3 {
                    reply(503, "")
                } else {
                    reply(200, "[]")
                }
            });

        let body = client(transport).get("zones/", None, &[]).unwrap();
        assert_eq!(body.as_ref(), b"[]");
    }

    #[test]
    fn test_map_status_to_error() {
        let server = |code: u16| {
            let status = StatusCode::from_u16(code).unwrap();
            Error::Server(ServerError::new(status, "detail"))
        };
        let mapped = |code: u16| map_status_to_error(server(code));
        let detail = String::from("detail");

        assert_eq!(mapped(400), Error::BadRequest(detail.clone()));
        assert_eq!(mapped(401), Error::Permission(detail.clone()));
        assert_eq!(mapped(403), Error::Permission(detail.clone()));
        assert_eq!(mapped(404), Error::NoMatch(detail.clone()));
        assert_eq!(mapped(409), Error::CannotComplete(detail));
        assert_eq!(mapped(500), server(500));
        assert_eq!(mapped(503), server(503));

        let transport = Error::Transport(TransportError::new("refused"));
        assert_eq!(map_status_to_error(transport.clone()), transport);
    }
}
