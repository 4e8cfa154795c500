#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # pcapture
//!
//! Capture a CPU profile of the running process and publish it to a pgo
//! collector under a tag.
//!
//! - [`Capture::start`] begins sampling into a temporary file.
//! - [`Capture::emit`] stops sampling and streams the profile to
//!   `POST {server_url}/{tag}` as `multipart/form-data`, field `cpu_profile`.
//!   The upload happens at most once; every caller gets the same outcome.
//!
//! ## Example
//!
//! ```ignore
//! use pcapture::{Capture, CaptureConfig};
//!
//! let capture = Capture::start("checkout-service", CaptureConfig::default())?;
//!
//! // ... serve traffic ...
//!
//! if let Err(e) = capture.emit(None).await {
//!     tracing::error!("Failed to publish profile: {e}");
//! }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod sampler;
pub mod transport;

pub use capture::{Capture, CaptureState};
pub use config::{CaptureConfig, DEFAULT_SERVER_URL};
pub use error::{CaptureError, Result};
pub use sampler::{PprofSampler, Sampler};
pub use transport::{EncodedBody, FORM_FIELD, MultipartEncoder};
pub use tokio_util::sync::CancellationToken;
