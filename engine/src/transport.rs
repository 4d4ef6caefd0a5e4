//! The seam between the engine and whatever performs HTTP.
//!
//! The engine never opens a socket. A [`Transport`] receives fully-formed
//! [`Request`]s and resolves to a [`RawResponse`] or a [`TransportError`];
//! status-code interpretation happens one layer up in [`crate::Client`].

use crate::Attrs;
use futures::future::LocalBoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// HTTP verbs used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the transport's host
    pub path: String,
    /// Query-string parameters
    pub query: Attrs,
    pub headers: BTreeMap<String, String>,
    /// JSON body, if any
    pub json: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Attrs::new(),
            headers: BTreeMap::new(),
            json: None,
        }
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the transport got back, before status interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are stored lower-cased
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body; `Null` when the body was empty
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A network-level failure: nothing usable came back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Performs requests on behalf of the engine.
///
/// Implementations own timeouts, connection reuse and TLS; the engine only
/// retries when a caller-supplied policy asks it to.
pub trait Transport {
    /// Base URL requests are resolved against, used in error context.
    fn host(&self) -> &str;

    /// Send one request.
    fn send(&self, request: Request) -> LocalBoxFuture<'static, Result<RawResponse, TransportError>>;
}
