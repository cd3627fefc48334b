//! Assembly of one full rotation from streamed measurement batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use scanlink_protocol::{QualityMode, SamplePoint};
use thiserror::Error;
use tracing::debug;

use crate::driver::{SensorDriver, SensorError};
use crate::sample::RawSample;

const CAPTURE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::capture");

/// Default number of samples requested per batch.
pub const DEFAULT_BATCH_CAPACITY: usize = 8192;

/// Default upper bound on samples gathered while waiting for wrap-around.
pub const DEFAULT_MAX_SAMPLES: usize = 65_536;

/// Default pause after an empty batch.
pub const DEFAULT_EMPTY_BACKOFF: Duration = Duration::from_millis(10);

/// Default time allowed for one capture.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that abort a capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The driver failed to deliver a batch.
    #[error("failed to grab measurements: {0}")]
    Grab(#[source] SensorError),
    /// Cancellation was requested before the rotation completed.
    #[error("capture interrupted")]
    Interrupted,
    /// No wrap-around was seen within the sample limit.
    #[error("no full rotation within {limit} samples")]
    Overflow {
        /// Sample limit that was exceeded.
        limit: usize,
    },
    /// No full rotation arrived before the deadline.
    #[error("no full rotation within {timeout:?}")]
    Timeout {
        /// Time allowed for the capture.
        timeout: Duration,
    },
}

/// One complete sweep in ascending angle order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rotation {
    samples: Vec<RawSample>,
}

impl Rotation {
    /// Raw samples of the sweep.
    #[must_use]
    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    /// Number of samples in the sweep.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the sweep holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Converts the sweep to response units.
    #[must_use]
    pub fn to_points(&self, quality: QualityMode) -> Vec<SamplePoint> {
        self.samples
            .iter()
            .map(|sample| sample.to_point(quality))
            .collect()
    }
}

/// Captures exactly one rotation per call.
///
/// Samples are taken in arrival order. A rotation ends at the first sample
/// whose angle is strictly below the last one kept. Drivers that
/// [mark rotation starts](SensorDriver::marks_rotation_start) also end it at
/// the next flagged sample, and their captures skip everything before the
/// first flagged sample. The sample that ends a rotation is discarded and the
/// finished rotation is ordered with [`SensorDriver::ascend`].
#[derive(Debug, Clone, Copy)]
pub struct RotationCapture {
    batch_capacity: usize,
    max_samples: usize,
    empty_backoff: Duration,
    timeout: Duration,
}

impl Default for RotationCapture {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            max_samples: DEFAULT_MAX_SAMPLES,
            empty_backoff: DEFAULT_EMPTY_BACKOFF,
            timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }
}

impl RotationCapture {
    /// Creates an engine with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the batch size requested from the driver.
    #[must_use]
    pub const fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    /// Overrides the sample limit.
    #[must_use]
    pub const fn with_max_samples(mut self, limit: usize) -> Self {
        self.max_samples = limit;
        self
    }

    /// Overrides the pause after an empty batch.
    #[must_use]
    pub const fn with_empty_backoff(mut self, backoff: Duration) -> Self {
        self.empty_backoff = backoff;
        self
    }

    /// Overrides the time allowed for one capture.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Captures one rotation from `driver`.
    ///
    /// `cancel` and the deadline are checked before every batch.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Grab`] on driver failure,
    /// [`CaptureError::Interrupted`] once `cancel` is set,
    /// [`CaptureError::Overflow`] when the sample limit is exceeded and
    /// [`CaptureError::Timeout`] when the deadline passes. No partial rotation
    /// is returned.
    pub fn capture(
        &self,
        driver: &mut dyn SensorDriver,
        cancel: &AtomicBool,
    ) -> Result<Rotation, CaptureError> {
        let deadline = Instant::now() + self.timeout;
        let mut sweep = Sweep::new(driver.marks_rotation_start());
        let mut batches = 0_usize;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(CaptureError::Interrupted);
            }
            if Instant::now() >= deadline {
                return Err(CaptureError::Timeout {
                    timeout: self.timeout,
                });
            }

            let batch = driver
                .grab_batch(self.batch_capacity)
                .map_err(CaptureError::Grab)?;
            batches += 1;
            if batch.is_empty() {
                thread::sleep(self.empty_backoff);
                continue;
            }

            if batch.into_iter().any(|sample| sweep.offer(sample)) {
                let mut samples = sweep.samples;
                driver.ascend(&mut samples);
                debug!(
                    target: CAPTURE_TARGET,
                    samples = samples.len(),
                    batches,
                    skipped = sweep.skipped,
                    "rotation captured"
                );
                return Ok(Rotation { samples });
            }

            if sweep.samples.len() > self.max_samples {
                return Err(CaptureError::Overflow {
                    limit: self.max_samples,
                });
            }
        }
    }
}

/// Samples gathered so far by one capture, in arrival order.
#[derive(Debug)]
struct Sweep {
    samples: Vec<RawSample>,
    flagged: bool,
    skipped: usize,
}

impl Sweep {
    const fn new(flagged: bool) -> Self {
        Self {
            samples: Vec::new(),
            flagged,
            skipped: 0,
        }
    }

    /// Takes `sample`, returning `true` when it starts the next rotation.
    fn offer(&mut self, sample: RawSample) -> bool {
        let Some(last) = self.samples.last() else {
            if self.flagged && !sample.is_sync() {
                self.skipped += 1;
            } else {
                self.samples.push(sample);
            }
            return false;
        };
        if sample.angle_z_q14 < last.angle_z_q14 || (self.flagged && sample.is_sync()) {
            return true;
        }
        self.samples.push(sample);
        false
    }
}
