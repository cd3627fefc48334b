//! Wire types shared by the scan-session server and its clients.
//!
//! Clients send one bare command keyword per line:
//!
//! ```text
//! START_SCAN
//! GET_SAMPLE
//! ```
//!
//! The server answers every line (and every new connection) with exactly one
//! JSON object per line, wrapped in a [`ResponseEnvelope`]:
//!
//! ```json
//! {"command":"GET_HEALTH","response":{"status":"HEALTH_OK","error_code":0}}
//! ```
//!
//! The envelope is append-only: fields may be added to payloads, never
//! renamed or removed.

mod command;
mod quality;
mod response;

pub use command::{CONNECT_COMMAND, Command};
pub use quality::{QUALITY_SHIFT, QualityMode, QualityModeParseError};
pub use response::{
    DeviceInfoReply, FailureReason, FirmwareVersion, HealthReply, HealthVerdict, Response,
    ResponseEnvelope, SamplePoint, SampleReply, Status, StatusReply,
};
