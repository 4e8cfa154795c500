//! Publishing captures to a mock collector.

#![allow(clippy::unwrap_used)]

use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pcapture::{Capture, CaptureConfig, CaptureError, CaptureState, CancellationToken, Sampler};
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Writes a fixed payload when stopped.
struct FixedSampler {
    payload: Vec<u8>,
    stops: Arc<AtomicUsize>,
}

impl FixedSampler {
    fn new(payload: impl Into<Vec<u8>>) -> (Self, Arc<AtomicUsize>) {
        let stops = Arc::new(AtomicUsize::new(0));
        let sampler = Self {
            payload: payload.into(),
            stops: Arc::clone(&stops),
        };
        (sampler, stops)
    }
}

impl Sampler for FixedSampler {
    fn start(&mut self) -> pcapture::Result<()> {
        Ok(())
    }

    fn stop(&mut self, sink: &mut File) -> pcapture::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        sink.write_all(&self.payload)?;
        Ok(())
    }
}

struct FailingSampler;

impl Sampler for FailingSampler {
    fn start(&mut self) -> pcapture::Result<()> {
        Ok(())
    }

    fn stop(&mut self, _sink: &mut File) -> pcapture::Result<()> {
        Err(CaptureError::io("Failed to encode profile"))
    }
}

fn config_for(server: &MockServer) -> CaptureConfig {
    CaptureConfig::with_server(&format!("{}/profile", server.uri()))
        .unwrap()
        .timeout(Duration::from_secs(30))
}

#[tokio::test]
async fn test_emit_streams_profile_as_multipart() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/profile/checkout"))
        .and(header_regex("content-type", "^multipart/form-data; boundary=.+$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (sampler, _) = FixedSampler::new(b"pprof-bytes".to_vec());
    let capture = Capture::start_with("checkout", config_for(&server), sampler)?;
    assert_eq!(capture.state(), CaptureState::Capturing);

    capture.emit(None).await?;
    assert_eq!(capture.state(), CaptureState::Emitted);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"cpu_profile\""));
    assert!(body.contains("pprof-bytes"));
    Ok(())
}

#[tokio::test]
async fn test_large_profile_arrives_intact() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/profile/big"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let payload: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let (sampler, _) = FixedSampler::new(payload.clone());
    let config = config_for(&server).chunk_size(16 * 1024);
    let capture = Capture::start_with("big", config, sampler)?;

    capture.emit(None).await?;

    let requests = server.received_requests().await.unwrap();
    let body = &requests[0].body;
    assert!(body.windows(payload.len()).any(|window| window == payload.as_slice()));
    Ok(())
}

#[tokio::test]
async fn test_tag_is_path_escaped() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/profile/a%20b%2Fc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (sampler, _) = FixedSampler::new(b"x".to_vec());
    let capture = Capture::start_with("a b/c", config_for(&server), sampler)?;
    capture.emit(None).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_emits_publish_once() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/profile/svc"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let (sampler, stops) = FixedSampler::new(b"profile".to_vec());
    let capture = Arc::new(Capture::start_with("svc", config_for(&server), sampler)?);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let capture = Arc::clone(&capture);
            tokio::spawn(async move { capture.emit(None).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await?, Ok(()));
    }
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(capture.emit(None).await, Ok(()));
    Ok(())
}

#[tokio::test]
async fn test_rejection_is_shared_by_later_emits() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/profile/svc"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database error: disk full"))
        .expect(1)
        .mount(&server)
        .await;

    let (sampler, _) = FixedSampler::new(b"profile".to_vec());
    let capture = Capture::start_with("svc", config_for(&server), sampler)?;

    let first = capture.emit(None).await.unwrap_err();
    assert_eq!(first.status(), Some(500));
    assert_eq!(
        first,
        CaptureError::rejected(500, "database error: disk full")
    );
    assert_eq!(
        first.to_string(),
        "unexpected status code response from profiling server: 500"
    );

    let second = capture.emit(None).await.unwrap_err();
    assert_eq!(second, first);
    Ok(())
}

#[tokio::test]
async fn test_bad_request_is_rejected() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Unrecognized file: other"))
        .mount(&server)
        .await;

    let (sampler, _) = FixedSampler::new(b"profile".to_vec());
    let capture = Capture::start_with("svc", config_for(&server), sampler)?;

    let err = capture.emit(None).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    Ok(())
}

#[tokio::test]
async fn test_slow_collector_times_out() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let (sampler, _) = FixedSampler::new(b"profile".to_vec());
    let config = config_for(&server).timeout(Duration::from_millis(200));
    let capture = Capture::start_with("svc", config, sampler)?;

    let err = capture.emit(None).await.unwrap_err();
    assert!(matches!(err, CaptureError::Transport { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn test_cancelled_emit_settles_as_cancelled() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let (sampler, _) = FixedSampler::new(b"profile".to_vec());
    let capture = Capture::start_with("svc", config_for(&server), sampler)?;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    assert_eq!(capture.emit(Some(&token)).await, Err(CaptureError::Cancelled));
    assert_eq!(capture.emit(None).await, Err(CaptureError::Cancelled));
    Ok(())
}

#[tokio::test]
async fn test_sampler_failure_sends_nothing() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let capture = Capture::start_with("svc", config_for(&server), FailingSampler)?;

    let err = capture.emit(None).await.unwrap_err();
    assert_eq!(err, CaptureError::io("Failed to encode profile"));
    Ok(())
}

#[tokio::test]
async fn test_sink_dir_is_used() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let (sampler, _) = FixedSampler::new(b"profile".to_vec());
    let config = config_for(&server).sink_dir(dir.path());
    let capture = Capture::start_with("svc", config, sampler)?;

    capture.emit(None).await?;
    Ok(())
}
