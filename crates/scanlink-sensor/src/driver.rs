//! Capability traits implemented by sensor drivers.

use std::io;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::sample::{RawSample, ascend_by_rotation};

/// Health status reported by the sensor firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No fault.
    Ok,
    /// Degraded but operational.
    Warning,
    /// Internal fault; scanning is unreliable.
    Error,
}

/// Result of a health query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHealth {
    /// Reported status.
    pub status: HealthStatus,
    /// Vendor error code.
    pub error_code: u16,
}

impl DeviceHealth {
    /// Health report with no fault.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
            error_code: 0,
        }
    }

    /// Health report carrying an internal error.
    #[must_use]
    pub const fn error(error_code: u16) -> Self {
        Self {
            status: HealthStatus::Error,
            error_code,
        }
    }

    /// Returns `true` unless the sensor reports an internal error.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        !matches!(self.status, HealthStatus::Error)
    }
}

/// Identification block reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Model identifier.
    pub model: u8,
    /// Firmware revision, major in the high byte.
    pub firmware_version: u16,
    /// Hardware revision.
    pub hardware_version: u8,
    /// Unique serial number.
    pub serial_number: [u8; 16],
}

/// Errors raised by sensor drivers.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The serial device could not be opened.
    #[error("failed to open sensor port '{port}': {source}")]
    Open {
        /// Device path.
        port: Utf8PathBuf,
        /// Underlying serial error.
        #[source]
        source: serialport::Error,
    },
    /// A serial line setting could not be applied.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// Reading from or writing to the sensor failed.
    #[error("sensor I/O failed: {0}")]
    Io(#[from] io::Error),
    /// The sensor did not answer in time.
    #[error("sensor did not answer {request} within {timeout:?}")]
    Timeout {
        /// Request that went unanswered.
        request: &'static str,
        /// How long the driver waited.
        timeout: Duration,
    },
    /// The sensor sent bytes that do not match the protocol.
    #[error("sensor protocol violation: {message}")]
    Protocol {
        /// What was wrong with the response.
        message: String,
    },
    /// The sensor reports an internal fault.
    #[error("sensor reports internal error (code {error_code:#06x})")]
    Unhealthy {
        /// Vendor error code.
        error_code: u16,
    },
    /// A scan-only operation was attempted while idle.
    #[error("sensor is not scanning")]
    NotScanning,
    /// The background reader exited.
    #[error("sensor reader stopped: {message}")]
    ReaderStopped {
        /// Reason the reader gave up.
        message: String,
    },
}

impl SensorError {
    /// Creates a protocol violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a reader-stopped error.
    pub fn reader_stopped(message: impl Into<String>) -> Self {
        Self::ReaderStopped {
            message: message.into(),
        }
    }
}

/// Operations a connected sensor offers.
///
/// Calls are issued from one thread at a time; implementations that stream
/// data in the background own their threads and stop them on drop.
pub trait SensorDriver: Send {
    /// Queries the sensor's self-test result.
    ///
    /// # Errors
    ///
    /// Returns an error when the query cannot be completed.
    fn health(&mut self) -> Result<DeviceHealth, SensorError>;

    /// Queries the sensor's identification block.
    ///
    /// # Errors
    ///
    /// Returns an error when the query cannot be completed.
    fn device_info(&mut self) -> Result<DeviceInfo, SensorError>;

    /// Sets the motor speed; zero stops the motor.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot be sent.
    fn set_motor_speed(&mut self, speed: u16) -> Result<(), SensorError>;

    /// Starts streaming measurements.
    ///
    /// # Errors
    ///
    /// Returns an error when the sensor refuses or cannot be reached.
    fn start_scan(&mut self, force: bool, use_typical_scan: bool) -> Result<(), SensorError>;

    /// Stops streaming measurements. Stopping an idle sensor succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error when the command cannot be sent.
    fn stop_scan(&mut self) -> Result<(), SensorError>;

    /// Returns up to `capacity` buffered measurements.
    ///
    /// An empty batch means nothing new was available.
    ///
    /// # Errors
    ///
    /// Returns an error when measurements cannot be retrieved.
    fn grab_batch(&mut self, capacity: usize) -> Result<Vec<RawSample>, SensorError>;

    /// Orders captured samples by ascending angle.
    fn ascend(&self, samples: &mut [RawSample]) {
        ascend_by_rotation(samples);
    }

    /// Returns `true` when the first sample of every rotation carries
    /// [`SYNC_FLAG`](crate::SYNC_FLAG).
    ///
    /// Captures from such drivers start at a flagged sample and end at the
    /// next one, so a sweep never begins mid-rotation.
    fn marks_rotation_start(&self) -> bool {
        false
    }

    /// Returns `true` while measurements are streaming.
    fn is_scanning(&self) -> bool;
}

/// Opens sensor connections.
pub trait SensorConnector: Send + Sync {
    /// Connects to the sensor on `port` at `baudrate`.
    ///
    /// # Errors
    ///
    /// Returns an error when the device cannot be opened or does not answer.
    fn connect(&self, port: &Utf8Path, baudrate: u32)
    -> Result<Box<dyn SensorDriver>, SensorError>;
}
