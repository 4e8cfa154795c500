//! The capture controller.
//!
//! A [`Capture`] starts sampling as soon as it is created. The first call to
//! [`Capture::emit`] stops the sampler, streams the recorded profile to the
//! collector and remembers the outcome. Every other call, concurrent or
//! later, waits for that first attempt and receives the same outcome.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result, chain};
use crate::sampler::{PprofSampler, Sampler};
use crate::transport::MultipartEncoder;

/// Where a capture is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Sampling; nothing has been emitted yet.
    Capturing,
    /// The first emit is stopping the sampler or uploading.
    Emitting,
    /// The emit outcome is settled.
    Emitted,
}

struct Active {
    sampler: Box<dyn Sampler>,
    sink: File,
}

/// A running CPU profile capture for one tag.
pub struct Capture {
    tag: String,
    config: CaptureConfig,
    client: reqwest::Client,
    active: Mutex<Option<Active>>,
    outcome: OnceCell<Result<()>>,
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture")
            .field("tag", &self.tag)
            .field("state", &self.state())
            .field("server_url", &self.config.server_url)
            .finish_non_exhaustive()
    }
}

impl Capture {
    /// Start profiling this process with the pprof sampler.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Init`] if the sink cannot be created or the
    /// profiler cannot be started, and [`CaptureError::Config`] if the
    /// collector URL cannot address `tag`.
    pub fn start(tag: impl Into<String>, config: CaptureConfig) -> Result<Self> {
        let sampler = PprofSampler::new(config.frequency);
        Self::start_with(tag, config, sampler)
    }

    /// Start a capture driven by a custom sampler.
    ///
    /// # Errors
    ///
    /// Same as [`Capture::start`].
    pub fn start_with<S: Sampler>(
        tag: impl Into<String>,
        config: CaptureConfig,
        mut sampler: S,
    ) -> Result<Self> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(CaptureError::init("No tag supplied"));
        }
        config.profile_url(&tag)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CaptureError::init(format!("failed to build http client: {}", chain(&e))))?;

        let sink = open_sink(config.sink_dir.as_deref())
            .map_err(|e| CaptureError::init(format!("Failed to create cpu profiling file: {e}")))?;

        sampler.start()?;
        debug!(tag = %tag, frequency = config.frequency, "CPU profiling started");

        Ok(Self {
            tag,
            config,
            client,
            active: Mutex::new(Some(Active {
                sampler: Box::new(sampler),
                sink,
            })),
            outcome: OnceCell::new(),
        })
    }

    /// The tag the profile is published under.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CaptureState {
        if self.outcome.initialized() {
            return CaptureState::Emitted;
        }
        let capturing = self
            .active
            .lock()
            .map(|active| active.is_some())
            .unwrap_or(false);
        if capturing {
            CaptureState::Capturing
        } else {
            CaptureState::Emitting
        }
    }

    /// Stop profiling and publish the profile, at most once.
    ///
    /// Concurrent callers wait for the first attempt and all get its
    /// outcome; later calls return it immediately. `cancel` bounds the
    /// upload of the attempt that actually runs: once it fires the request
    /// is dropped and the outcome is [`CaptureError::Cancelled`].
    ///
    /// # Errors
    ///
    /// - [`CaptureError::Io`] if the profile could not be written or read back
    /// - [`CaptureError::Transport`] if the request could not be completed
    /// - [`CaptureError::Rejected`] if the collector answered with a non-200 status
    /// - [`CaptureError::Cancelled`] if `cancel` fired during the upload
    pub async fn emit(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        self.outcome
            .get_or_init(|| self.publish(cancel))
            .await
            .clone()
    }

    /// The settled emit outcome, if any.
    #[must_use]
    pub fn outcome(&self) -> Option<&Result<()>> {
        self.outcome.get()
    }

    async fn publish(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let result = self.upload(cancel).await;
        match &result {
            Ok(()) => info!(tag = %self.tag, "Profile published"),
            Err(e) => warn!(tag = %self.tag, error = %e, "Profile publish failed"),
        }
        result
    }

    async fn upload(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let Active { mut sampler, mut sink } = self.take_active()?;

        let sink = tokio::task::spawn_blocking(move || -> Result<File> {
            sampler.stop(&mut sink)?;
            sink.flush()?;
            sink.seek(SeekFrom::Start(0))?;
            Ok(sink)
        })
        .await
        .map_err(|e| CaptureError::io(format!("profiler stop task failed: {e}")))??;

        let url = self.config.profile_url(&self.tag)?;
        let body = MultipartEncoder::new(self.config.chunk_size)
            .encode(tokio::fs::File::from_std(sink));
        let content_type = body.content_type().to_string();
        let (stream, producer) = body.into_parts();

        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(reqwest::Body::wrap_stream(stream))
            .send();

        let sent = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    producer.abort();
                    return Err(CaptureError::Cancelled);
                }
                sent = request => sent,
            },
            None => request.await,
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => return Err(send_failure(producer, &e).await),
        };
        debug!(url = %url, status = %response.status(), "Profile request sent");

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(CaptureError::rejected(status.as_u16(), body));
        }
        Ok(())
    }

    fn take_active(&self) -> Result<Active> {
        self.active
            .lock()
            .map_err(|e| CaptureError::io(format!("capture state lock poisoned: {e}")))?
            .take()
            .ok_or_else(|| CaptureError::io("profile was consumed by an interrupted emit"))
    }
}

/// Tell a failing sink apart from a failing connection.
async fn send_failure(producer: JoinHandle<std::io::Result<()>>, err: &reqwest::Error) -> CaptureError {
    if producer.is_finished() {
        if let Ok(Err(e)) = producer.await {
            return CaptureError::from(e);
        }
    } else {
        producer.abort();
    }
    CaptureError::transport(chain(err))
}

fn open_sink(dir: Option<&Path>) -> std::io::Result<File> {
    match dir {
        Some(dir) => tempfile::tempfile_in(dir),
        None => tempfile::tempfile(),
    }
}
