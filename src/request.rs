//! Incoming HTTP request metadata.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Version};

use crate::method::Method;

struct Head {
    method: Method,
    path: String,
    query: Option<String>,
    version: Version,
    headers: HeaderMap,
    params: HashMap<String, String>,
    remote_addr: SocketAddr,
}

/// An incoming HTTP request.
///
/// Cloning is cheap: the head is shared and the body is a [`Bytes`] handle.
/// After a hijack the duplex handler receives a clone of the same value, so
/// path, headers and query stay available for the life of the connection.
#[derive(Clone)]
pub struct Request {
    head: Arc<Head>,
    body: Bytes,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        uri: &http::Uri,
        version: Version,
        headers: HeaderMap,
        params: HashMap<String, String>,
        remote_addr: SocketAddr,
    ) -> Self {
        let head = Head {
            method,
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            version,
            headers,
            params,
            remote_addr,
        };
        Self { head: Arc::new(head), body: Bytes::new() }
    }

    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    pub fn method(&self) -> Method { self.head.method }
    pub fn path(&self) -> &str { &self.head.path }
    pub fn version(&self) -> Version { self.head.version }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn remote_addr(&self) -> SocketAddr { self.head.remote_addr }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> { self.head.query.as_deref() }

    /// First value of a form-urlencoded query parameter, percent-decoded.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.head.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Case-insensitive header lookup. Non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/rooms/{id}`, `req.param("id")` on `/rooms/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.head.params.get(key).map(String::as_str)
    }

    /// Whether the request asks to switch protocols: an `Upgrade` header
    /// together with an `upgrade` token in `Connection`.
    pub fn is_upgrade(&self) -> bool {
        self.head.headers.contains_key(http::header::UPGRADE)
            && has_token(&self.head.headers, http::header::CONNECTION, "upgrade")
    }
}

/// Whether a comma-separated header contains `token`, ignoring ASCII case.
pub(crate) fn has_token(headers: &HeaderMap, name: http::header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
pub(crate) fn test_request(method: Method, target: &str, headers: &[(&str, &str)]) -> Request {
    let uri: http::Uri = target.parse().unwrap();
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        map.append(
            http::header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
            v.parse().unwrap(),
        );
    }
    Request::new(
        method,
        &uri,
        Version::HTTP_11,
        map,
        HashMap::new(),
        "127.0.0.1:9".parse().unwrap(),
    )
}
