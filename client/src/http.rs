//! `reqwest`-backed transport.

use crate::error::Result;
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tether_engine::{Attrs, Method, RawResponse, Request, Transport, TransportError};

/// Sends engine requests over HTTP.
///
/// Paths are resolved against `host`; query values that are not strings are
/// sent JSON-encoded.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    host: String,
}

impl HttpTransport {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, host))
    }

    /// Use a preconfigured `reqwest` client.
    pub fn with_client(http: reqwest::Client, host: impl Into<String>) -> Self {
        let host = host.into().trim_end_matches('/').to_string();
        Self { http, host }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path.trim_start_matches('/'))
    }
}

impl Transport for HttpTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn send(&self, request: Request) -> LocalBoxFuture<'static, std::result::Result<RawResponse, TransportError>> {
        let mut builder = self
            .http
            .request(to_reqwest(request.method), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&query_pairs(&request.query));
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(json) = &request.json {
            builder = builder.json(json);
        }

        async move {
            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status().as_u16();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    let value = value.to_str().ok()?;
                    Some((name.as_str().to_ascii_lowercase(), value.to_string()))
                })
                .collect();
            let bytes = response.bytes().await.map_err(transport_error)?;
            Ok(RawResponse {
                status,
                headers,
                body: parse_body(&bytes),
            })
        }
        .boxed_local()
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

fn query_pairs(query: &Attrs) -> Vec<(String, String)> {
    query
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Empty bodies become `Null`; anything that is not JSON is kept as a string.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn transport_error(err: reqwest::Error) -> TransportError {
    tracing::debug!(error = %err, timeout = err.is_timeout(), "http request failed");
    TransportError(err.to_string())
}
