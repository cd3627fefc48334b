//! Execution of individual commands against the sensor.
//!
//! Each function runs with the driver handle locked and turns every sensor
//! outcome into a wire response; nothing here fails.

use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

use scanlink_protocol::{
    Command, DeviceInfoReply, FailureReason, HealthReply, HealthVerdict, Response,
    ResponseEnvelope, SampleReply, Status, StatusReply,
};
use scanlink_sensor::{CaptureError, DriverHandle, HealthStatus};

use super::{SESSION_TARGET, SessionSettings};

/// Runs `command` and wraps the outcome in its envelope.
pub(crate) fn execute(
    handle: &mut DriverHandle,
    command: &Command,
    settings: &SessionSettings,
    cancel: &AtomicBool,
) -> ResponseEnvelope {
    let response = match command {
        Command::StartScan => start_scan(handle, settings.motor_speed).into(),
        Command::GetSample => get_sample(handle, settings, cancel),
        Command::Stop => stop(handle).into(),
        Command::GetInfo => get_info(handle),
        Command::GetHealth => get_health(handle),
        Command::Unknown(text) => {
            warn!(target: SESSION_TARGET, command = %text, "unknown command");
            Status::UnknownCommand.into()
        }
    };
    ResponseEnvelope::new(command.name(), response)
}

fn start_scan(handle: &mut DriverHandle, motor_speed: u16) -> StatusReply {
    let Some(driver) = handle.scanner() else {
        warn!(target: SESSION_TARGET, "start requested without a healthy sensor");
        return StatusReply::failed("Failed to start LiDAR scan");
    };
    if let Err(error) = driver.set_motor_speed(motor_speed) {
        warn!(target: SESSION_TARGET, error = %error, motor_speed, "failed to set motor speed");
    }
    match driver.start_scan(false, true) {
        Ok(()) => {
            info!(target: SESSION_TARGET, motor_speed, "scan started");
            StatusReply::ok("LiDAR scan started")
        }
        Err(error) => {
            warn!(target: SESSION_TARGET, error = %error, "failed to start scan");
            StatusReply::failed("Failed to start LiDAR scan")
        }
    }
}

fn get_sample(
    handle: &mut DriverHandle,
    settings: &SessionSettings,
    cancel: &AtomicBool,
) -> Response {
    let Some(driver) = handle.scanner() else {
        return StatusReply::failed("LiDAR driver unavailable")
            .with_reason(FailureReason::DriverUnavailable)
            .into();
    };
    match settings.capture.capture(driver, cancel) {
        Ok(rotation) => SampleReply::new(rotation.to_points(settings.quality)).into(),
        Err(error) => {
            warn!(target: SESSION_TARGET, error = %error, "capture failed");
            capture_failure(&error).into()
        }
    }
}

fn capture_failure(error: &CaptureError) -> StatusReply {
    match error {
        CaptureError::Grab(_) => StatusReply::failed("Failed to retrieve LiDAR sample")
            .with_reason(FailureReason::GrabFailed),
        CaptureError::Interrupted => StatusReply::failed("Capture interrupted by shutdown")
            .with_reason(FailureReason::CaptureInterrupted),
        CaptureError::Overflow { .. } => {
            StatusReply::failed(error.to_string()).with_reason(FailureReason::RotationOverflow)
        }
        CaptureError::Timeout { .. } => {
            StatusReply::failed(error.to_string()).with_reason(FailureReason::CaptureTimeout)
        }
    }
}

fn stop(handle: &mut DriverHandle) -> StatusReply {
    let Some(driver) = handle.driver() else {
        return StatusReply::failed("Failed to stop LiDAR scan");
    };
    if let Err(error) = driver.stop_scan() {
        warn!(target: SESSION_TARGET, error = %error, "failed to stop scan");
    }
    if let Err(error) = driver.set_motor_speed(0) {
        warn!(target: SESSION_TARGET, error = %error, "failed to stop motor");
    }
    info!(target: SESSION_TARGET, "scan stopped");
    StatusReply::ok("LiDAR scan stopped")
}

fn get_info(handle: &mut DriverHandle) -> Response {
    let info = handle.driver().map(|driver| driver.device_info());
    match info {
        Some(Ok(info)) => DeviceInfoReply {
            model: info.model,
            firmware_version: info.firmware_version.into(),
            hardware_version: info.hardware_version,
        }
        .into(),
        Some(Err(error)) => {
            warn!(target: SESSION_TARGET, error = %error, "device info query failed");
            Status::InfoFailed.into()
        }
        None => Status::InfoFailed.into(),
    }
}

fn get_health(handle: &mut DriverHandle) -> Response {
    let health = handle.driver().map(|driver| driver.health());
    match health {
        Some(Ok(health)) => {
            let status = match health.status {
                HealthStatus::Ok => HealthVerdict::Ok,
                HealthStatus::Warning | HealthStatus::Error => HealthVerdict::Error,
            };
            HealthReply {
                status,
                error_code: health.error_code,
            }
            .into()
        }
        Some(Err(error)) => {
            warn!(target: SESSION_TARGET, error = %error, "health query failed");
            Status::HealthFailed.into()
        }
        None => Status::HealthFailed.into(),
    }
}
