//! Streaming `multipart/form-data` encoding for profile uploads.
//!
//! A producer task writes the part preamble, copies the source in chunks and
//! writes the closing boundary into a bounded channel. The HTTP client reads
//! the other end as the request body while the producer is still writing, so
//! at most `CHANNEL_DEPTH` chunks of the profile are in memory at once.
//!
//! If the producer fails, the error is delivered through the channel and the
//! body stream ends with it, failing the request instead of truncating it.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Form field the collector reads the profile from.
pub const FORM_FIELD: &str = "cpu_profile";

/// Chunks buffered between the producer and the HTTP body.
pub const CHANNEL_DEPTH: usize = 4;

/// Builds single-part multipart bodies around a byte source.
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    boundary: String,
    chunk_size: usize,
}

impl MultipartEncoder {
    /// Create an encoder with a random boundary.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self::with_boundary(format!("pgo-{}", uuid::Uuid::new_v4().simple()), chunk_size)
    }

    /// Create an encoder with a fixed boundary.
    #[must_use]
    pub fn with_boundary(boundary: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            boundary: boundary.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// The multipart boundary.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` header value for the encoded body.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Opening boundary and part headers.
    #[must_use]
    pub fn preamble(&self) -> Bytes {
        Bytes::from(format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"{FORM_FIELD}\"; filename=\"{FORM_FIELD}\"\r\n\
             Content-Type: application/octet-stream\r\n\
             \r\n",
            boundary = self.boundary,
        ))
    }

    /// Closing boundary.
    #[must_use]
    pub fn trailer(&self) -> Bytes {
        Bytes::from(format!("\r\n--{}--\r\n", self.boundary))
    }

    /// Start encoding `source` on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn encode<R>(self, source: R) -> EncodedBody
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let content_type = self.content_type();

        let producer = tokio::spawn(async move {
            let result = self.produce(source, &tx).await;
            if let Err(e) = &result {
                // The receiver may already be gone; then nobody is waiting for the error.
                let _ = tx.send(Err(std::io::Error::new(e.kind(), e.to_string()))).await;
            }
            result
        });

        EncodedBody {
            content_type,
            stream: ReceiverStream::new(rx),
            producer,
        }
    }

    async fn produce<R>(
        &self,
        mut source: R,
        tx: &mpsc::Sender<std::io::Result<Bytes>>,
    ) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        if tx.send(Ok(self.preamble())).await.is_err() {
            debug!("Upload body dropped before preamble");
            return Ok(());
        }

        let mut copied = 0_usize;
        loop {
            let mut chunk = BytesMut::with_capacity(self.chunk_size);
            let read = source.read_buf(&mut chunk).await?;
            if read == 0 {
                break;
            }
            copied = copied.saturating_add(read);
            if tx.send(Ok(chunk.freeze())).await.is_err() {
                debug!(bytes = copied, "Upload body dropped mid-copy");
                return Ok(());
            }
        }

        if tx.send(Ok(self.trailer())).await.is_err() {
            debug!("Upload body dropped before trailer");
        }
        debug!(bytes = copied, "Encoded profile part");
        Ok(())
    }
}

/// A multipart body being produced in the background.
#[derive(Debug)]
pub struct EncodedBody {
    content_type: String,
    stream: ReceiverStream<std::io::Result<Bytes>>,
    producer: JoinHandle<std::io::Result<()>>,
}

impl EncodedBody {
    /// `Content-Type` header value for this body.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Split into the body stream and the producer task handle.
    ///
    /// The handle resolves to the producer's own result. Aborting it stops
    /// the producer and releases the source.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        ReceiverStream<std::io::Result<Bytes>>,
        JoinHandle<std::io::Result<()>>,
    ) {
        (self.stream, self.producer)
    }
}
