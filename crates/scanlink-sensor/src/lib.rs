//! Sensor access for the scan-session daemon.
//!
//! The daemon talks to the rangefinder only through the [`SensorDriver`]
//! capability. [`DriverHandle`] owns the single connection and
//! [`RotationCapture`] assembles one full sweep from the batches a driver
//! delivers. Two drivers are provided: [`rplidar`] for SLAMTEC units on a
//! serial port and [`simulated`] for running without hardware.

mod capture;
mod driver;
mod handle;
pub mod rplidar;
mod sample;
pub mod simulated;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use capture::{
    CaptureError, DEFAULT_BATCH_CAPACITY, DEFAULT_CAPTURE_TIMEOUT, DEFAULT_EMPTY_BACKOFF,
    DEFAULT_MAX_SAMPLES, Rotation, RotationCapture,
};
pub use driver::{
    DeviceHealth, DeviceInfo, HealthStatus, SensorConnector, SensorDriver, SensorError,
};
pub use handle::{DriverHandle, HandleState, HealthCheck, SharedDriver};
pub use sample::{RawSample, SYNC_FLAG, angle_to_q14, ascend_by_rotation};
