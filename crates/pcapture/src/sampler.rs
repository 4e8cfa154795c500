//! CPU samplers driven by a [`Capture`](crate::Capture).

use std::fs::File;
use std::io::Write;

use pprof::protos::Message;
use pprof::{ProfilerGuard, ProfilerGuardBuilder};
use tracing::{debug, info};

use crate::error::{CaptureError, Result};

/// Frames from these libraries are dropped from samples.
const BLOCKLIST: [&str; 4] = ["libc", "libgcc", "pthread", "vdso"];

/// A sampling profiler with a start/stop lifecycle.
///
/// `stop` writes the finished profile to the sink; the capture controller
/// rewinds the sink and uploads whatever was written.
pub trait Sampler: Send + 'static {
    /// Begin sampling.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Init` if sampling cannot start.
    fn start(&mut self) -> Result<()>;

    /// Stop sampling and write the encoded profile to `sink`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Io` if the profile cannot be produced or written.
    fn stop(&mut self, sink: &mut File) -> Result<()>;
}

/// Samples the current process with `pprof` and writes a protobuf profile.
///
/// Only one `PprofSampler` can be running in a process at a time.
pub struct PprofSampler {
    frequency: i32,
    guard: Option<ProfilerGuard<'static>>,
}

impl PprofSampler {
    /// Create a sampler that will sample at `frequency` Hz once started.
    #[must_use]
    pub const fn new(frequency: i32) -> Self {
        Self {
            frequency,
            guard: None,
        }
    }

    /// Whether the profiler is currently running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.guard.is_some()
    }
}

impl std::fmt::Debug for PprofSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PprofSampler")
            .field("frequency", &self.frequency)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Sampler for PprofSampler {
    fn start(&mut self) -> Result<()> {
        if self.guard.is_some() {
            return Err(CaptureError::init("CPU profiler already running"));
        }

        let guard = ProfilerGuardBuilder::default()
            .frequency(self.frequency)
            .blocklist(&BLOCKLIST)
            .build()
            .map_err(|e| CaptureError::init(format!("Error while creating CPU profile: {e}")))?;
        self.guard = Some(guard);

        info!(frequency = self.frequency, "CPU profiling via pprof");
        Ok(())
    }

    fn stop(&mut self, sink: &mut File) -> Result<()> {
        let guard = self
            .guard
            .take()
            .ok_or_else(|| CaptureError::io("CPU profiler is not running"))?;

        let report = guard
            .report()
            .build()
            .map_err(|e| CaptureError::io(format!("Failed to build CPU profile report: {e}")))?;
        // Dropping the guard stops the sampling timer.
        drop(guard);

        let profile = report
            .pprof()
            .map_err(|e| CaptureError::io(format!("Failed to encode CPU profile: {e}")))?;
        let encoded = profile.encode_to_vec();

        sink.write_all(&encoded)?;
        sink.flush()?;

        debug!(bytes = encoded.len(), "Wrote CPU profile to sink");
        Ok(())
    }
}
