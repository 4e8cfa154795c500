//! Configuration for the capture client.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{CaptureError, Result};

/// Collector endpoint used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080/profile";

/// Configuration for a [`Capture`](crate::Capture).
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Base URL of the collector's profile route. The tag is appended as a
    /// path segment.
    pub server_url: String,

    /// Upper bound on the whole publish request.
    pub timeout: Duration,

    /// Sampling frequency in Hz.
    pub frequency: i32,

    /// Directory for the temporary capture file. Defaults to the system
    /// temp directory.
    pub sink_dir: Option<PathBuf>,

    /// Largest chunk the encoder reads from the sink at once.
    pub chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            timeout: default_timeout(),
            frequency: default_frequency(),
            sink_dir: None,
            chunk_size: default_chunk_size(),
        }
    }
}

impl CaptureConfig {
    /// Create a config that publishes to `server_url`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Config` if `server_url` is not a valid base URL.
    pub fn with_server(server_url: &str) -> Result<Self> {
        parse_server_url(server_url)?;
        Ok(Self {
            server_url: server_url.to_string(),
            ..Default::default()
        })
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the sampling frequency.
    #[must_use]
    pub const fn frequency(mut self, frequency: i32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set the directory for the capture file.
    #[must_use]
    pub fn sink_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sink_dir = Some(dir.into());
        self
    }

    /// Set the encoder read size.
    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `PGO_SERVER_URL`, `PGO_TIMEOUT_SECS` and `PGO_FREQUENCY`;
    /// unset or unparseable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("PGO_SERVER_URL") {
            if parse_server_url(&url).is_ok() {
                config.server_url = url;
            }
        }

        if let Ok(secs) = std::env::var("PGO_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(frequency) = std::env::var("PGO_FREQUENCY") {
            if let Ok(frequency) = frequency.parse() {
                config.frequency = frequency;
            }
        }

        config
    }

    /// URL the profile for `tag` is posted to.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Config` if the server URL is invalid or cannot
    /// take path segments.
    pub fn profile_url(&self, tag: &str) -> Result<Url> {
        let mut url = parse_server_url(&self.server_url)?;
        url.path_segments_mut()
            .map_err(|()| {
                CaptureError::config(format!("server URL cannot be a base: {}", self.server_url))
            })?
            .pop_if_empty()
            .push(tag);
        Ok(url)
    }
}

fn parse_server_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| CaptureError::config(format!("invalid server URL {raw:?}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(CaptureError::config(format!(
            "server URL cannot be a base: {raw}"
        )));
    }
    Ok(url)
}

const fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

const fn default_frequency() -> i32 {
    100
}

const fn default_chunk_size() -> usize {
    64 * 1024
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();
        assert_eq!(config.server_url, "http://localhost:8080/profile");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.frequency, 100);
        assert!(config.sink_dir.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = CaptureConfig::with_server("http://collector:9000/profile")
            .unwrap()
            .timeout(Duration::from_secs(30))
            .frequency(250)
            .sink_dir("/var/tmp")
            .chunk_size(4096);

        assert_eq!(config.server_url, "http://collector:9000/profile");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.frequency, 250);
        assert_eq!(config.sink_dir, Some(PathBuf::from("/var/tmp")));
        assert_eq!(config.chunk_size, 4096);
    }

    #[test]
    fn test_invalid_server_url_rejected() {
        assert!(matches!(
            CaptureConfig::with_server("not a url"),
            Err(CaptureError::Config { .. })
        ));
        assert!(matches!(
            CaptureConfig::with_server("mailto:ops@example.com"),
            Err(CaptureError::Config { .. })
        ));
    }

    #[test]
    fn test_profile_url_appends_tag() {
        let config = CaptureConfig::default();
        assert_eq!(
            config.profile_url("example").unwrap().as_str(),
            "http://localhost:8080/profile/example"
        );
    }

    #[test]
    fn test_profile_url_tolerates_trailing_slash_and_escapes_tag() {
        let config = CaptureConfig::with_server("http://localhost:8080/profile/").unwrap();
        assert_eq!(
            config.profile_url("a b/c").unwrap().as_str(),
            "http://localhost:8080/profile/a%20b%2Fc"
        );
    }
}
