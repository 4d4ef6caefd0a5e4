//! Error types for the client crate.

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {var} value: {value:?} is not a number")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Invalid {var} value: {value:?} is not a boolean")]
    InvalidBool { var: &'static str, value: String },

    #[error("TETHER_HOST must not be empty")]
    EmptyHost,
}

/// Client setup error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for client setup.
pub type Result<T> = std::result::Result<T, Error>;
