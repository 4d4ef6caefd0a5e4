//! Request layer: builds requests, hands them to the transport and maps
//! response statuses onto [`Error`]s.

use crate::error::{ApiError, RequestContext};
use crate::retry::RetryPolicy;
use crate::transport::{Method, RawResponse, Request, Transport};
use crate::{Attrs, Error, Result};
use futures::future::{self, FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Header carrying the API token.
pub const TOKEN_HEADER: &str = "api-token";

const UNEXPECTED_MESSAGE: &str = "an unknown error occurred";

/// Per-call status table.
///
/// `true` is a success, `false` an expected failure surfaced as
/// [`Error::Api`]. Statuses absent from the table become
/// [`Error::Unexpected`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCodes(BTreeMap<u16, bool>);

impl StatusCodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(mut self, status: u16) -> Self {
        self.0.insert(status, true);
        self
    }

    pub fn failure(mut self, status: u16) -> Self {
        self.0.insert(status, false);
        self
    }

    pub fn get(&self, status: u16) -> Option<bool> {
        self.0.get(&status).copied()
    }

    fn preset(ok: &[u16], expected: &[u16]) -> Self {
        let mut table = Self::new();
        for status in ok {
            table = table.success(*status);
        }
        for status in expected {
            table = table.failure(*status);
        }
        table
    }

    pub fn create() -> Self {
        Self::preset(&[201], &[400, 401, 409])
    }

    pub fn fetch() -> Self {
        Self::preset(&[200, 304], &[400, 401, 404])
    }

    pub fn update() -> Self {
        Self::preset(&[200], &[400, 401, 404, 409])
    }

    pub fn destroy() -> Self {
        Self::preset(&[200, 204], &[400, 401, 404])
    }

    pub fn list() -> Self {
        Self::preset(&[200], &[400, 401, 404])
    }

    pub fn head() -> Self {
        Self::preset(&[200, 204], &[400, 401, 404])
    }
}

/// Options accepted by every network operation.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Target id; defaults to the entity's own id
    pub id: Option<String>,
    pub json: Option<Value>,
    pub qs: Option<Attrs>,
    pub headers: BTreeMap<String, String>,
    /// Overrides the operation's default status table
    pub status_codes: Option<StatusCodes>,
    /// Full replace (PUT) instead of merge (PATCH) on update
    pub put: bool,
    pub retry: Option<RetryPolicy>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options carrying only a JSON body.
    pub fn json(body: impl Into<Value>) -> Self {
        Self::new().with_json(body)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_json(mut self, body: impl Into<Value>) -> Self {
        self.json = Some(body.into());
        self
    }

    pub fn with_qs(mut self, qs: Attrs) -> Self {
        self.qs = Some(qs);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_status_codes(mut self, table: StatusCodes) -> Self {
        self.status_codes = Some(table);
        self
    }

    pub fn with_put(mut self) -> Self {
        self.put = true;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// The JSON body as an attribute bag, if it is an object.
    pub(crate) fn json_attrs(&self) -> Option<Attrs> {
        match &self.json {
            Some(Value::Object(map)) => Some(map.clone()),
            _ => None,
        }
    }

    /// Fill in the status table unless the caller supplied one.
    pub(crate) fn or_status_codes(mut self, table: StatusCodes) -> Self {
        if self.status_codes.is_none() {
            self.status_codes = Some(table);
        }
        self
    }
}

impl From<Attrs> for RequestOptions {
    fn from(attrs: Attrs) -> Self {
        Self::json(Value::Object(attrs))
    }
}

/// A response whose status the table accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
    /// Lower-cased header names
    pub headers: BTreeMap<String, String>,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Shared handle to a transport plus per-client request defaults.
#[derive(Clone)]
pub struct Client {
    transport: Rc<dyn Transport>,
    token: Option<String>,
}

impl Client {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_rc(Rc::new(transport))
    }

    pub fn from_rc(transport: Rc<dyn Transport>) -> Self {
        Self {
            transport,
            token: None,
        }
    }

    /// Attach `token` to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    pub fn get(&self, path: &str, opts: &RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        self.send(Method::Get, path, opts)
    }

    pub fn post(&self, path: &str, opts: &RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        self.send(Method::Post, path, opts)
    }

    pub fn put(&self, path: &str, opts: &RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        self.send(Method::Put, path, opts)
    }

    pub fn patch(&self, path: &str, opts: &RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        self.send(Method::Patch, path, opts)
    }

    pub fn delete(&self, path: &str, opts: &RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        self.send(Method::Delete, path, opts)
    }

    pub fn head(&self, path: &str, opts: &RequestOptions) -> LocalBoxFuture<'static, Result<Reply>> {
        self.send(Method::Head, path, opts)
    }

    /// Issue one request and interpret its status against `opts.status_codes`.
    pub fn send(
        &self,
        method: Method,
        path: &str,
        opts: &RequestOptions,
    ) -> LocalBoxFuture<'static, Result<Reply>> {
        let mut request = Request::new(method, path);
        if let Some(qs) = &opts.qs {
            request.query = qs.clone();
        }
        request.headers = opts.headers.clone();
        if let Some(token) = &self.token {
            request
                .headers
                .insert(TOKEN_HEADER.to_string(), token.clone());
        }
        request.json = opts.json.clone();

        let context = RequestContext {
            host: self.host().to_string(),
            method,
            path: path.to_string(),
        };
        let table = opts.status_codes.clone();

        tracing::debug!(%method, path, "sending request");
        let pending = self.transport.send(request);

        async move {
            let raw = pending.await.map_err(|err| Error::Transport {
                message: err.0,
                request: Some(context.clone()),
            })?;
            tracing::trace!(%method, path = %context.path, status = raw.status, "response received");
            interpret(table.as_ref(), raw, context)
        }
        .boxed_local()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn interpret(table: Option<&StatusCodes>, raw: RawResponse, request: RequestContext) -> Result<Reply> {
    let RawResponse {
        status,
        headers,
        body,
    } = raw;

    match table.map(|table| table.get(status)) {
        None | Some(Some(true)) => Ok(Reply {
            status,
            body,
            headers,
        }),
        Some(Some(false)) => {
            let (message, body) = if status == 304 {
                ("Not modified".to_string(), Value::Object(Attrs::new()))
            } else {
                let message = body_message(&body)
                    .unwrap_or_else(|| format!("request failed with status {status}"));
                (message, body)
            };
            Err(Error::Api(ApiError {
                status,
                message,
                body,
                request,
            }))
        }
        Some(None) => Err(Error::Unexpected(ApiError {
            status,
            message: body_message(&body).unwrap_or_else(|| UNEXPECTED_MESSAGE.to_string()),
            body,
            request,
        })),
    }
}

fn body_message(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => map.get("message").and_then(Value::as_str).map(str::to_string),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// An already-failed operation future.
pub(crate) fn fail<T: 'static>(err: Error) -> LocalBoxFuture<'static, Result<T>> {
    future::ready(Err(err)).boxed_local()
}
