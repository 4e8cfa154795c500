#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # pgo-server
//!
//! HTTP ingestion server for CPU profiles.
//!
//! - `POST /profile/{tag}` stores the `cpu_profile` part of a multipart upload
//! - `GET /profile/{tag}` returns it as `default.pgo`
//!
//! Persistence is delegated to a [`pgo_store::ProfileStore`].
//!
//! ## Example
//!
//! ```ignore
//! use pgo_server::{ServerConfig, run_server};
//!
//! let config = ServerConfig::default();
//! let store = config.store_config().open()?;
//! let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
//! run_server(listener, store.clone(), shutdown_signal(), config.shutdown_grace).await?;
//! store.close().await?;
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{AppError, ServerError};
pub use server::{create_app, run_server};
pub use state::AppState;
