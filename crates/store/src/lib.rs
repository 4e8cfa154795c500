#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # pgo-store
//!
//! Persistence for captured CPU profiles, keyed by tag.
//!
//! The ingestion server depends only on the [`ProfileStore`] trait:
//!
//! - `put(tag, stream)` consumes the whole stream and upserts the profile.
//!   Nothing is written unless the stream completes.
//! - `get(tag)` streams back exactly the bytes of the last successful `put`,
//!   or fails with [`StoreError::NoProfile`].
//! - `close()` releases backend resources.
//!
//! Two backends are provided: [`SqliteProfileStore`] for durable storage and
//! [`InMemoryProfileStore`] for tests and ephemeral servers.
//!
//! ## Example
//!
//! ```ignore
//! use pgo_store::{bytes_stream, read_to_end, ProfileStore, SqliteProfileStore, Tag};
//!
//! let store = SqliteProfileStore::open("./profiles.db")?;
//! let tag = Tag::new("release-42")?;
//! store.put(&tag, bytes_stream(profile_bytes)).await?;
//! let stored = read_to_end(store.get(&tag).await?).await?;
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};

pub mod config;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod tag;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use memory::InMemoryProfileStore;
pub use sqlite::SqliteProfileStore;
pub use tag::Tag;

/// A readable stream of profile bytes.
pub type ProfileStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

/// Storage contract for tag-keyed profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Consume `profile` and upsert it under `tag`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Stream` if the stream fails before completion, in
    /// which case nothing is written, or a backend error if the write fails.
    async fn put(&self, tag: &Tag, profile: ProfileStream<'_>) -> Result<()>;

    /// Stream the profile last stored under `tag`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NoProfile` if nothing is stored under `tag`.
    async fn get(&self, tag: &Tag) -> Result<ProfileStream<'static>>;

    /// Release backend resources. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to shut down cleanly.
    async fn close(&self) -> Result<()>;
}

/// Drain a profile stream into one contiguous buffer.
///
/// # Errors
///
/// Returns `StoreError::Stream` with the underlying I/O error text if the
/// stream yields an error.
pub async fn read_to_end(profile: ProfileStream<'_>) -> Result<Vec<u8>> {
    profile
        .map_err(|e| StoreError::stream(e.to_string()))
        .try_fold(Vec::new(), |mut buffer, chunk| async move {
            buffer.extend_from_slice(&chunk);
            Ok(buffer)
        })
        .await
}

/// Wrap an in-memory buffer as a single-chunk profile stream.
pub fn bytes_stream(data: impl Into<Bytes>) -> ProfileStream<'static> {
    let data = data.into();
    stream::once(async move { Ok(data) }).boxed()
}
