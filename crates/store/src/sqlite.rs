//! SQLite-backed profile store.
//!
//! One table keyed by tag:
//!
//! ```sql
//! CREATE TABLE profiles (tag TEXT PRIMARY KEY, cpu_profile BLOB, created_at DATETIME)
//! ```
//!
//! Writes are a single `INSERT .. ON CONFLICT DO UPDATE`, so a record is either
//! fully replaced or left alone. SQLite serializes writers; the connection is
//! shared behind a mutex and every statement runs on the blocking pool.
//!
//! `rusqlite` binds blobs from memory, so `put` buffers the upload and `get`
//! loads the whole blob before streaming it back.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::tag::Tag;
use crate::{ProfileStore, ProfileStream, bytes_stream, read_to_end};

const MIGRATION: &str = "
    CREATE TABLE IF NOT EXISTS profiles (
        tag TEXT PRIMARY KEY,
        cpu_profile BLOB,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
";

// created_at is written as fixed-width RFC 3339, so MAX() compares it in time order.
const UPSERT: &str = "
    INSERT INTO profiles (tag, cpu_profile, created_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(tag) DO UPDATE SET
        cpu_profile = excluded.cpu_profile,
        created_at = MAX(profiles.created_at, excluded.created_at)
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Profile store backed by a single SQLite connection.
#[derive(Debug, Clone)]
pub struct SqliteProfileStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteProfileStore {
    /// Open or create the database at `path` and run the schema migration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the file cannot be opened or the
    /// migration fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StoreError::database(format!("Failed to open database: {e}")))?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.display(), "Opened profile database");
        Ok(store)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::database(format!("Failed to open database: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(MIGRATION)
            .map_err(|e| StoreError::database(format!("failed to run migrations: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// When the profile under `tag` was last written, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the query fails or the stored
    /// timestamp cannot be parsed.
    pub async fn created_at(&self, tag: &Tag) -> Result<Option<DateTime<Utc>>> {
        let tag = tag.as_str().to_owned();
        let raw: Option<String> = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT created_at FROM profiles WHERE tag = ?1",
                    [&tag],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        raw.as_deref().map(parse_timestamp).transpose()
    }

    fn ensure_open(&self) -> Result<()> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| StoreError::database(format!("Lock error: {e}")))?;
        if guard.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::database(format!("Lock error: {e}")))?;
            let conn = guard.as_ref().ok_or(StoreError::Closed)?;
            f(conn)
        })
        .await?
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn put(&self, tag: &Tag, profile: ProfileStream<'_>) -> Result<()> {
        self.ensure_open()?;

        let blob = read_to_end(profile).await?;
        let size = blob.len();
        let key = tag.as_str().to_owned();
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        self.run(move |conn| {
            conn.execute(UPSERT, (&key, &blob, &created_at))
                .map_err(|e| {
                    StoreError::database(format!(
                        "Failed to insert cpu profile blob for {key:?}: {e}"
                    ))
                })
                .map(|_| ())
        })
        .await?;

        debug!(tag = %tag, bytes = size, "Stored profile");
        Ok(())
    }

    async fn get(&self, tag: &Tag) -> Result<ProfileStream<'static>> {
        let key = tag.as_str().to_owned();
        let row: Option<Option<Vec<u8>>> = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT cpu_profile FROM profiles WHERE tag = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| {
                    StoreError::database(format!("Failed to retrieve profile for {key:?}: {e}"))
                })
            })
            .await?;

        let blob = row.ok_or_else(|| StoreError::no_profile(tag.as_str()))?;
        Ok(bytes_stream(blob.unwrap_or_default()))
    }

    async fn close(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::database(format!("Lock error: {e}")))?
            .take();

        match conn {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| StoreError::database(format!("Failed to close database: {e}"))),
            None => Ok(()),
        }
    }
}

/// Parse a stored timestamp. Rows written by SQLite's `CURRENT_TIMESTAMP`
/// default use `YYYY-MM-DD HH:MM:SS` in UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ts| ts.and_utc())
        })
        .map_err(|e| StoreError::database(format!("Invalid created_at {raw:?}: {e}")))
}
