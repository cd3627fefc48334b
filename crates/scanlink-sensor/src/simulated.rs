//! Deterministic stand-in for a sensor attached to a serial port.
//!
//! The simulated sensor sits in the middle of a rectangular room and sweeps
//! it at a fixed angular resolution. Batches are cut at a fixed size that
//! does not divide the rotation, so rotation boundaries fall inside batches
//! the way they do on real hardware.

use camino::Utf8Path;
use tracing::info;

use crate::driver::{DeviceHealth, DeviceInfo, SensorConnector, SensorDriver, SensorError};
use crate::sample::{RawSample, angle_to_q14};

const SIMULATED_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::simulated");

/// Room and sweep parameters for the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomConfig {
    /// Distance to the left and right walls in millimetres.
    pub half_width_mm: f32,
    /// Distance to the front and back walls in millimetres.
    pub half_depth_mm: f32,
    /// Samples per rotation.
    pub samples_per_rotation: u16,
    /// Samples delivered per batch.
    pub batch_size: usize,
    /// Raw quality byte reported for every sample.
    pub quality: u8,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            half_width_mm: 2_500.0,
            half_depth_mm: 1_800.0,
            samples_per_rotation: 720,
            batch_size: 250,
            quality: 47 << 2,
        }
    }
}

/// Connects [`SimulatedSensor`]s regardless of port and baud rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedConnector {
    room: RoomConfig,
}

impl SimulatedConnector {
    /// Creates a connector for the default room.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector for a custom room.
    #[must_use]
    pub const fn with_room(room: RoomConfig) -> Self {
        Self { room }
    }
}

impl SensorConnector for SimulatedConnector {
    fn connect(
        &self,
        port: &Utf8Path,
        baudrate: u32,
    ) -> Result<Box<dyn SensorDriver>, SensorError> {
        info!(
            target: SIMULATED_TARGET,
            port = %port,
            baudrate,
            "simulated sensor attached"
        );
        Ok(Box::new(SimulatedSensor::new(self.room)))
    }
}

/// Simulated sensor streaming rotations of a rectangular room.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    room: RoomConfig,
    scanning: bool,
    motor_speed: u16,
    cursor: u16,
}

impl SimulatedSensor {
    /// Creates an idle sensor.
    #[must_use]
    pub const fn new(room: RoomConfig) -> Self {
        Self {
            room,
            scanning: false,
            motor_speed: 0,
            cursor: 0,
        }
    }

    /// Current motor speed.
    #[must_use]
    pub const fn motor_speed(&self) -> u16 {
        self.motor_speed
    }

    fn sample_at(&self, index: u16) -> RawSample {
        let degrees = f32::from(index) * 360.0 / f32::from(self.room.samples_per_rotation);
        let radians = degrees.to_radians();
        let to_side = self.room.half_width_mm / radians.cos().abs();
        let to_front = self.room.half_depth_mm / radians.sin().abs();
        let distance = to_side.min(to_front);
        let sample = RawSample::new(angle_to_q14(degrees), distance_q2(distance), self.room.quality);
        if index == 0 { sample.with_sync() } else { sample }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "room distances are positive and far below u32::MAX"
)]
fn distance_q2(millimetres: f32) -> u32 {
    (millimetres * 4.0).round().max(0.0) as u32
}

impl SensorDriver for SimulatedSensor {
    fn health(&mut self) -> Result<DeviceHealth, SensorError> {
        Ok(DeviceHealth::ok())
    }

    fn device_info(&mut self) -> Result<DeviceInfo, SensorError> {
        Ok(DeviceInfo {
            model: 0x18,
            firmware_version: 0x011D,
            hardware_version: 7,
            serial_number: *b"SCANLINK-SIM-001",
        })
    }

    fn set_motor_speed(&mut self, speed: u16) -> Result<(), SensorError> {
        self.motor_speed = speed;
        Ok(())
    }

    fn start_scan(&mut self, _force: bool, _use_typical_scan: bool) -> Result<(), SensorError> {
        if !self.scanning {
            self.scanning = true;
            self.cursor = 0;
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), SensorError> {
        self.scanning = false;
        Ok(())
    }

    fn grab_batch(&mut self, capacity: usize) -> Result<Vec<RawSample>, SensorError> {
        if !self.scanning {
            return Err(SensorError::NotScanning);
        }
        let count = self.room.batch_size.min(capacity);
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            batch.push(self.sample_at(self.cursor));
            self.cursor = (self.cursor + 1) % self.room.samples_per_rotation.max(1);
        }
        Ok(batch)
    }

    fn is_scanning(&self) -> bool {
        self.scanning
    }

    fn marks_rotation_start(&self) -> bool {
        true
    }
}
