//! Response envelope and payload shapes.
//!
//! Every line the server writes is a [`ResponseEnvelope`]. The `response`
//! member takes one of four shapes, distinguished by their fields rather than
//! by an explicit tag, so clients written against the plain JSON keep working.

use serde::{Deserialize, Serialize};

use crate::command::CONNECT_COMMAND;

/// One line of server output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Command name this line answers; unknown text is echoed verbatim.
    pub command: String,
    /// Command-specific payload.
    pub response: Response,
}

impl ResponseEnvelope {
    /// Wraps a payload for the named command.
    pub fn new(command: impl Into<String>, response: impl Into<Response>) -> Self {
        Self {
            command: command.into(),
            response: response.into(),
        }
    }

    /// Builds the greeting sent when a client connects.
    #[must_use]
    pub fn connect(sensor_ready: bool) -> Self {
        let reply = if sensor_ready {
            StatusReply::ok("LIDAR connection established")
        } else {
            StatusReply::new(Status::LidarError).with_message("LIDAR is unavailable or unhealthy")
        };
        Self::new(CONNECT_COMMAND, reply)
    }
}

/// Payload of a [`ResponseEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// One captured rotation.
    Samples(SampleReply),
    /// Device identification.
    Info(DeviceInfoReply),
    /// Sensor self-test verdict.
    Health(HealthReply),
    /// Plain status with optional detail.
    Status(StatusReply),
}

impl From<SampleReply> for Response {
    fn from(value: SampleReply) -> Self {
        Self::Samples(value)
    }
}

impl From<DeviceInfoReply> for Response {
    fn from(value: DeviceInfoReply) -> Self {
        Self::Info(value)
    }
}

impl From<HealthReply> for Response {
    fn from(value: HealthReply) -> Self {
        Self::Health(value)
    }
}

impl From<StatusReply> for Response {
    fn from(value: StatusReply) -> Self {
        Self::Status(value)
    }
}

impl From<Status> for Response {
    fn from(value: Status) -> Self {
        Self::Status(StatusReply::new(value))
    }
}

/// Status keywords used by [`StatusReply`] and [`SampleReply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The command succeeded.
    Ok,
    /// The command could not be carried out.
    Failed,
    /// The sensor is missing or unhealthy at connect time.
    LidarError,
    /// Device information could not be read.
    InfoFailed,
    /// The health query itself failed.
    HealthFailed,
    /// The command keyword was not recognised.
    UnknownCommand,
}

/// Machine-readable cause attached to a failed capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// No sensor connection is held.
    DriverUnavailable,
    /// The driver failed to deliver measurements.
    GrabFailed,
    /// The server began shutting down mid-capture.
    CaptureInterrupted,
    /// No wrap-around was seen before the sample limit.
    RotationOverflow,
    /// No full rotation arrived before the capture deadline.
    CaptureTimeout,
}

/// Status payload with optional human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    /// Outcome keyword.
    pub status: Status,
    /// Failure cause, present on capture failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Human-readable explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReply {
    /// Creates a bare status reply.
    #[must_use]
    pub const fn new(status: Status) -> Self {
        Self {
            status,
            reason: None,
            message: None,
        }
    }

    /// Creates an `OK` reply carrying a message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Status::Ok).with_message(message)
    }

    /// Creates a `FAILED` reply carrying a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Status::Failed).with_message(message)
    }

    /// Attaches a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a failure reason.
    #[must_use]
    pub const fn with_reason(mut self, reason: FailureReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// A single measurement in response units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    /// Bearing in degrees, `[0, 360)`.
    pub angle: f32,
    /// Range in millimetres; zero means no return.
    pub distance: f32,
    /// Signal quality.
    pub quality: u8,
}

/// Successful capture payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleReply {
    /// Always [`Status::Ok`].
    pub status: Status,
    /// Samples in ascending angle order.
    pub data: Vec<SamplePoint>,
}

impl SampleReply {
    /// Wraps a captured rotation.
    #[must_use]
    pub const fn new(data: Vec<SamplePoint>) -> Self {
        Self {
            status: Status::Ok,
            data,
        }
    }
}

/// Firmware revision split into its two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Major revision (high byte).
    pub major: u8,
    /// Minor revision (low byte).
    pub minor: u8,
}

impl From<u16> for FirmwareVersion {
    fn from(value: u16) -> Self {
        let [major, minor] = value.to_be_bytes();
        Self { major, minor }
    }
}

/// Device identification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfoReply {
    /// Model identifier byte.
    pub model: u8,
    /// Firmware revision.
    pub firmware_version: FirmwareVersion,
    /// Hardware revision.
    pub hardware_version: u8,
}

/// Health verdict keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthVerdict {
    /// The sensor reports no error.
    #[serde(rename = "HEALTH_OK")]
    Ok,
    /// The sensor reports a warning or an error.
    #[serde(rename = "HEALTH_ERROR")]
    Error,
}

/// Health payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReply {
    /// Verdict.
    pub status: HealthVerdict,
    /// Vendor error code; zero when healthy.
    pub error_code: u16,
}
