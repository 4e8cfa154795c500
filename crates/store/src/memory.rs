//! In-memory profile store.
//!
//! Holds profiles in a map guarded by an async `RwLock`. Suitable for tests
//! and for servers started with `--in-memory`; nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::tag::Tag;
use crate::{ProfileStore, ProfileStream, bytes_stream, read_to_end};

/// A stored profile and when it was last written.
#[derive(Debug, Clone)]
struct StoredProfile {
    blob: Bytes,
    created_at: DateTime<Utc>,
}

/// Profile store backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileStore {
    profiles: Arc<RwLock<HashMap<Tag, StoredProfile>>>,
    closed: Arc<AtomicBool>,
}

impl InMemoryProfileStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tags with a stored profile.
    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    /// Whether no profile has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }

    /// When the profile under `tag` was last written.
    pub async fn created_at(&self, tag: &Tag) -> Option<DateTime<Utc>> {
        self.profiles
            .read()
            .await
            .get(tag)
            .map(|profile| profile.created_at)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn put(&self, tag: &Tag, profile: ProfileStream<'_>) -> Result<()> {
        self.ensure_open()?;

        // Buffer first so a failed upload never replaces the previous profile.
        let blob = Bytes::from(read_to_end(profile).await?);
        let size = blob.len();

        let mut profiles = self.profiles.write().await;
        let created_at = profiles
            .get(tag)
            .map_or_else(Utc::now, |previous| previous.created_at.max(Utc::now()));
        profiles.insert(tag.clone(), StoredProfile { blob, created_at });
        drop(profiles);

        debug!(tag = %tag, bytes = size, "Stored profile in memory");
        Ok(())
    }

    async fn get(&self, tag: &Tag) -> Result<ProfileStream<'static>> {
        self.ensure_open()?;

        let profiles = self.profiles.read().await;
        let blob = profiles
            .get(tag)
            .map(|profile| profile.blob.clone())
            .ok_or_else(|| StoreError::no_profile(tag.as_str()))?;
        drop(profiles);

        Ok(bytes_stream(blob))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
