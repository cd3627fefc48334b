//! RPLIDAR serial framing.
//!
//! Requests are `A5 cmd` or `A5 cmd size payload checksum`. Every answered
//! request is preceded by a seven byte descriptor `A5 5A len:u30|mode:u2 type`.
//! Scan data streams as five byte measurement nodes.

use crate::driver::{DeviceHealth, DeviceInfo, HealthStatus, SensorError};
use crate::sample::{RawSample, SYNC_FLAG};

pub(crate) const SYNC_BYTE: u8 = 0xA5;
pub(crate) const SYNC_BYTE2: u8 = 0x5A;

pub(crate) const CMD_STOP: u8 = 0x25;
pub(crate) const CMD_SCAN: u8 = 0x20;
pub(crate) const CMD_FORCE_SCAN: u8 = 0x21;
pub(crate) const CMD_GET_INFO: u8 = 0x50;
pub(crate) const CMD_GET_HEALTH: u8 = 0x52;
pub(crate) const CMD_SET_MOTOR_PWM: u8 = 0xF0;

pub(crate) const ANS_TYPE_MEASUREMENT: u8 = 0x81;
pub(crate) const ANS_TYPE_DEVINFO: u8 = 0x04;
pub(crate) const ANS_TYPE_DEVHEALTH: u8 = 0x06;

pub(crate) const DESCRIPTOR_LEN: usize = 7;
pub(crate) const INFO_LEN: usize = 20;
pub(crate) const HEALTH_LEN: usize = 3;
pub(crate) const NODE_LEN: usize = 5;

const LENGTH_MASK: u32 = 0x3FFF_FFFF;
const MODE_SHIFT: u32 = 30;

/// Angle of a full turn in `q6` units.
const FULL_TURN_Q6: u32 = 360 << 6;

/// Encodes a request frame.
pub(crate) fn encode_request(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![SYNC_BYTE, command];
    if payload.is_empty() {
        return frame;
    }
    let size = u8::try_from(payload.len()).unwrap_or(u8::MAX);
    frame.push(size);
    frame.extend_from_slice(payload);
    let checksum = frame.iter().fold(0_u8, |acc, byte| acc ^ byte);
    frame.push(checksum);
    frame
}

/// Parsed response descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Descriptor {
    pub(crate) length: u32,
    pub(crate) mode: u8,
    pub(crate) data_type: u8,
}

impl Descriptor {
    pub(crate) fn parse(bytes: &[u8; DESCRIPTOR_LEN]) -> Result<Self, SensorError> {
        let [sync1, sync2, l0, l1, l2, l3, data_type] = *bytes;
        if sync1 != SYNC_BYTE || sync2 != SYNC_BYTE2 {
            return Err(SensorError::protocol(format!(
                "bad descriptor sync {sync1:#04x} {sync2:#04x}"
            )));
        }
        let packed = u32::from_le_bytes([l0, l1, l2, l3]);
        let mode = u8::try_from(packed >> MODE_SHIFT).unwrap_or_default();
        Ok(Self {
            length: packed & LENGTH_MASK,
            mode,
            data_type,
        })
    }

    pub(crate) fn require(self, data_type: u8, min_length: usize) -> Result<Self, SensorError> {
        if self.data_type != data_type {
            return Err(SensorError::protocol(format!(
                "expected answer type {data_type:#04x}, got {:#04x}",
                self.data_type
            )));
        }
        if (self.length as usize) < min_length {
            return Err(SensorError::protocol(format!(
                "answer of {} bytes is shorter than {min_length}",
                self.length
            )));
        }
        Ok(self)
    }
}

pub(crate) fn parse_info(bytes: &[u8; INFO_LEN]) -> DeviceInfo {
    let [model, minor, major, hardware_version, serial @ ..] = *bytes;
    DeviceInfo {
        model,
        firmware_version: u16::from_be_bytes([major, minor]),
        hardware_version,
        serial_number: serial,
    }
}

pub(crate) fn parse_health(bytes: &[u8; HEALTH_LEN]) -> Result<DeviceHealth, SensorError> {
    let [status, low, high] = *bytes;
    let status = match status {
        0 => HealthStatus::Ok,
        1 => HealthStatus::Warning,
        2 => HealthStatus::Error,
        other => {
            return Err(SensorError::protocol(format!(
                "unknown health status {other}"
            )));
        }
    };
    Ok(DeviceHealth {
        status,
        error_code: u16::from_le_bytes([low, high]),
    })
}

/// Decodes one measurement node into the high-resolution sample encoding.
///
/// Returns `None` when the start bit and its complement disagree or the
/// check bit is clear, which means the stream is misaligned.
pub(crate) fn decode_node(bytes: &[u8; NODE_LEN]) -> Option<RawSample> {
    let [head, angle_low, angle_high, dist_low, dist_high] = *bytes;
    let start = head & 0x01;
    let inverted_start = (head >> 1) & 0x01;
    if start == inverted_start || angle_low & 0x01 == 0 {
        return None;
    }

    let angle_q6 = u32::from(u16::from_le_bytes([angle_low, angle_high]) >> 1);
    if angle_q6 >= FULL_TURN_Q6 {
        return None;
    }
    let angle_z_q14 = u16::try_from((angle_q6 << 8) / 90).unwrap_or(u16::MAX);

    Some(RawSample {
        angle_z_q14,
        dist_mm_q2: u32::from(u16::from_le_bytes([dist_low, dist_high])),
        quality: head & 0xFC,
        flag: if start == 1 { SYNC_FLAG } else { 0 },
    })
}

/// Reassembles measurement nodes from arbitrary read boundaries.
#[derive(Debug, Default)]
pub(crate) struct NodeStream {
    pending: Vec<u8>,
    discarded: u64,
}

impl NodeStream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends bytes and returns every complete, valid node.
    ///
    /// Misaligned data is skipped one byte at a time until a valid node is
    /// found.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<RawSample> {
        self.pending.extend_from_slice(bytes);
        let mut samples = Vec::new();
        let mut offset = 0;
        while let Some(window) = self.pending.get(offset..offset + NODE_LEN) {
            let Ok(node) = <&[u8; NODE_LEN]>::try_from(window) else {
                break;
            };
            if let Some(sample) = decode_node(node) {
                samples.push(sample);
                offset += NODE_LEN;
            } else {
                self.discarded += 1;
                offset += 1;
            }
        }
        self.pending.drain(..offset);
        samples
    }

    /// Bytes skipped while resynchronising.
    pub(crate) const fn discarded(&self) -> u64 {
        self.discarded
    }
}

/// Groups streamed samples into rotations on the start flag.
#[derive(Debug, Default)]
pub(crate) struct RotationAssembler {
    current: Vec<RawSample>,
}

impl RotationAssembler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a sample, returning the finished rotation when `sample` starts
    /// the next one.
    ///
    /// Samples seen before the first start flag belong to a partial rotation
    /// and are dropped.
    pub(crate) fn push(&mut self, sample: RawSample) -> Option<Vec<RawSample>> {
        if !sample.is_sync() {
            if !self.current.is_empty() {
                self.current.push(sample);
            }
            return None;
        }
        let finished = std::mem::replace(&mut self.current, vec![sample]);
        (!finished.is_empty()).then_some(finished)
    }
}
