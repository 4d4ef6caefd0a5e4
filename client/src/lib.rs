//! # Tether Client
//!
//! The IO side of tether: an HTTP [`Transport`](tether_engine::Transport)
//! built on `reqwest`, environment-driven configuration and tracing setup.
//!
//! ```no_run
//! use tether_client::{init_tracing, ClientConfig};
//! use tether_engine::{EntityOptions, GenericKind, Parent, RequestOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! init_tracing();
//! let config = ClientConfig::from_env()?;
//! let root = config.connect()?;
//!
//! let users = GenericKind::new("User", "users").shared();
//! let me = root.new_child(users, "me", EntityOptions::new())?;
//! me.fetch(RequestOptions::new().with_retry(config.retry_policy())).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod telemetry;

pub use config::ClientConfig;
pub use error::{ConfigError, Error, Result};
pub use http::HttpTransport;
pub use telemetry::init_tracing;
