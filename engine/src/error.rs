//! Error types for the tether engine.

use crate::transport::Method;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Where a failed request was headed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub host: String,
    pub method: Method,
    pub path: String,
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.host, self.path)
    }
}

/// A response whose status the call's status table did not accept.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// HTTP status returned by the server
    pub status: u16,
    /// Server-provided message, or a default
    pub message: String,
    /// Raw response body
    pub body: Value,
    /// The request that produced this response
    pub request: RequestContext,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.status, self.message, self.request)
    }
}

/// All possible errors from the tether engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Validation errors
    #[error("id is required")]
    MissingId,

    #[error("create requires a body")]
    MissingBody,

    #[error("a query (qs) or no_store is required for new lists")]
    MissingQuery,

    #[error("{0} requires a client")]
    MissingClient(String),

    #[error("cannot call create on an existing {0}")]
    AlreadyCreated(String),

    #[error("name cannot contain /: {0}")]
    InvalidName(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("cannot check remote changes on {0} before it has been fetched")]
    NotFetched(String),

    // Lifecycle errors
    #[error("{kind} at '{path}' is destroyed and cannot be used anymore")]
    Destroyed { kind: String, path: String },

    // Response errors
    #[error("{list} fetch received a non-array response")]
    NonArrayResponse { list: String, body: Value },

    #[error("{0}")]
    Api(ApiError),

    #[error("unexpected response: {0}")]
    Unexpected(ApiError),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        request: Option<RequestContext>,
    },
}

impl Error {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(err) | Error::Unexpected(err) => Some(err.status),
            _ => None,
        }
    }

    /// Whether the response status was absent from the call's status table.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Error::Unexpected(_))
    }

    /// Whether this error was raised before anything was sent over the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingId
                | Error::MissingBody
                | Error::MissingQuery
                | Error::MissingClient(_)
                | Error::AlreadyCreated(_)
                | Error::InvalidName(_)
                | Error::InvalidPayload(_)
                | Error::NotFetched(_)
        )
    }

    /// Request context for network-level failures.
    pub fn request(&self) -> Option<&RequestContext> {
        match self {
            Error::Api(err) | Error::Unexpected(err) => Some(&err.request),
            Error::Transport { request, .. } => request.as_ref(),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
