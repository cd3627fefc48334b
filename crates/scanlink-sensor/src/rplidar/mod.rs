//! SLAMTEC RPLIDAR driver over a serial port.
//!
//! Requests and their answers are exchanged on the calling thread while the
//! sensor is idle. Once scanning starts, a reader thread owns a clone of the
//! port, decodes the measurement stream and keeps the newest complete
//! rotation for [`SensorDriver::grab_batch`]. Health and device information
//! are served from the values cached before scanning began, since the
//! sensor does not answer queries mid-stream.

mod protocol;
mod reader;

use std::io;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use self::protocol::{
    ANS_TYPE_DEVHEALTH, ANS_TYPE_DEVINFO, ANS_TYPE_MEASUREMENT, CMD_FORCE_SCAN, CMD_GET_HEALTH,
    CMD_GET_INFO, CMD_SCAN, CMD_SET_MOTOR_PWM, CMD_STOP, DESCRIPTOR_LEN, Descriptor, HEALTH_LEN,
    INFO_LEN, NODE_LEN, encode_request, parse_health, parse_info,
};
use self::reader::ScanReader;
use crate::driver::{DeviceHealth, DeviceInfo, SensorConnector, SensorDriver, SensorError};
use crate::sample::RawSample;

pub(crate) const RPLIDAR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rplidar");

/// How long a request waits for its answer.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long [`SensorDriver::grab_batch`] waits for a rotation.
pub const DEFAULT_GRAB_TIMEOUT: Duration = Duration::from_secs(2);

/// Serial read timeout used by the reader thread between stop checks.
const STREAM_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause after `STOP` so the sensor drains its transmit buffer.
const STOP_SETTLE: Duration = Duration::from_millis(10);

/// Answer mode announcing an unbounded stream.
const MODE_CONTINUOUS: u8 = 1;

/// Opens [`RplidarDriver`] connections.
#[derive(Debug, Clone, Copy)]
pub struct RplidarConnector {
    response_timeout: Duration,
    grab_timeout: Duration,
}

impl Default for RplidarConnector {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            grab_timeout: DEFAULT_GRAB_TIMEOUT,
        }
    }
}

impl RplidarConnector {
    /// Creates a connector with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides how long [`SensorDriver::grab_batch`] waits for a rotation.
    #[must_use]
    pub const fn with_grab_timeout(mut self, timeout: Duration) -> Self {
        self.grab_timeout = timeout;
        self
    }
}

impl SensorConnector for RplidarConnector {
    fn connect(
        &self,
        port: &Utf8Path,
        baudrate: u32,
    ) -> Result<Box<dyn SensorDriver>, SensorError> {
        let serial = serialport::new(port.as_str(), baudrate)
            .timeout(self.response_timeout)
            .open()
            .map_err(|source| SensorError::Open {
                port: port.to_path_buf(),
                source,
            })?;
        let driver = RplidarDriver::attach(serial, self.response_timeout, self.grab_timeout)?;
        info!(
            target: RPLIDAR_TARGET,
            port = %port,
            model = driver.info.model,
            firmware = format_args!("{:#06x}", driver.info.firmware_version),
            "rplidar attached"
        );
        Ok(Box::new(driver))
    }
}

/// Driver for one attached RPLIDAR.
pub struct RplidarDriver {
    port: Box<dyn SerialPort>,
    reader: Option<ScanReader>,
    info: DeviceInfo,
    health: DeviceHealth,
    response_timeout: Duration,
    grab_timeout: Duration,
}

impl RplidarDriver {
    fn attach(
        mut port: Box<dyn SerialPort>,
        response_timeout: Duration,
        grab_timeout: Duration,
    ) -> Result<Self, SensorError> {
        halt(port.as_mut())?;
        let info = query_info(port.as_mut(), response_timeout)?;
        let health = query_health(port.as_mut(), response_timeout)?;
        Ok(Self {
            port,
            reader: None,
            info,
            health,
            response_timeout,
            grab_timeout,
        })
    }

    fn scanning(&self) -> bool {
        self.reader.as_ref().is_some_and(ScanReader::is_running)
    }
}

impl SensorDriver for RplidarDriver {
    fn health(&mut self) -> Result<DeviceHealth, SensorError> {
        if !self.scanning() {
            self.health = query_health(self.port.as_mut(), self.response_timeout)?;
        }
        Ok(self.health)
    }

    fn device_info(&mut self) -> Result<DeviceInfo, SensorError> {
        if !self.scanning() {
            self.info = query_info(self.port.as_mut(), self.response_timeout)?;
        }
        Ok(self.info)
    }

    fn set_motor_speed(&mut self, speed: u16) -> Result<(), SensorError> {
        // A1 units drive the motor from DTR, later models from the PWM command.
        self.port.write_data_terminal_ready(speed == 0)?;
        send(self.port.as_mut(), CMD_SET_MOTOR_PWM, &speed.to_le_bytes())?;
        debug!(target: RPLIDAR_TARGET, speed, "motor speed set");
        Ok(())
    }

    fn start_scan(&mut self, force: bool, use_typical_scan: bool) -> Result<(), SensorError> {
        if self.scanning() {
            return Ok(());
        }
        // A reader that died is replaced.
        self.reader = None;

        self.port.clear(ClearBuffer::Input)?;
        let command = if force { CMD_FORCE_SCAN } else { CMD_SCAN };
        send(self.port.as_mut(), command, &[])?;
        let descriptor = read_descriptor(self.port.as_mut(), "scan", self.response_timeout)?
            .require(ANS_TYPE_MEASUREMENT, NODE_LEN)?;
        if descriptor.mode != MODE_CONTINUOUS {
            return Err(SensorError::protocol(format!(
                "scan answer mode {} is not continuous",
                descriptor.mode
            )));
        }

        let mut stream = self.port.try_clone()?;
        stream.set_timeout(STREAM_READ_TIMEOUT)?;
        self.reader = Some(ScanReader::spawn(stream)?);
        info!(
            target: RPLIDAR_TARGET,
            force,
            use_typical_scan,
            "scan started"
        );
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), SensorError> {
        let result = halt(self.port.as_mut());
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
            info!(target: RPLIDAR_TARGET, "scan stopped");
        }
        result
    }

    fn grab_batch(&mut self, capacity: usize) -> Result<Vec<RawSample>, SensorError> {
        let reader = self.reader.as_ref().ok_or(SensorError::NotScanning)?;
        let mut rotation = reader.next_rotation(self.grab_timeout)?;
        rotation.truncate(capacity);
        Ok(rotation)
    }

    fn is_scanning(&self) -> bool {
        self.scanning()
    }

    fn marks_rotation_start(&self) -> bool {
        true
    }
}

impl Drop for RplidarDriver {
    fn drop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
        }
    }
}

fn send(port: &mut dyn SerialPort, command: u8, payload: &[u8]) -> Result<(), SensorError> {
    port.write_all(&encode_request(command, payload))?;
    port.flush()?;
    Ok(())
}

/// Sends `STOP` and discards whatever the sensor was still streaming.
fn halt(port: &mut dyn SerialPort) -> Result<(), SensorError> {
    send(port, CMD_STOP, &[])?;
    thread::sleep(STOP_SETTLE);
    port.clear(ClearBuffer::Input)?;
    Ok(())
}

fn read_exact(
    port: &mut dyn SerialPort,
    buffer: &mut [u8],
    request: &'static str,
    timeout: Duration,
) -> Result<(), SensorError> {
    port.read_exact(buffer).map_err(|error| match error.kind() {
        io::ErrorKind::TimedOut => SensorError::Timeout { request, timeout },
        _ => SensorError::Io(error),
    })
}

fn read_descriptor(
    port: &mut dyn SerialPort,
    request: &'static str,
    timeout: Duration,
) -> Result<Descriptor, SensorError> {
    let mut bytes = [0_u8; DESCRIPTOR_LEN];
    read_exact(port, &mut bytes, request, timeout)?;
    Descriptor::parse(&bytes)
}

fn query_info(port: &mut dyn SerialPort, timeout: Duration) -> Result<DeviceInfo, SensorError> {
    port.clear(ClearBuffer::Input)?;
    send(port, CMD_GET_INFO, &[])?;
    read_descriptor(port, "device info", timeout)?.require(ANS_TYPE_DEVINFO, INFO_LEN)?;
    let mut bytes = [0_u8; INFO_LEN];
    read_exact(port, &mut bytes, "device info", timeout)?;
    Ok(parse_info(&bytes))
}

fn query_health(
    port: &mut dyn SerialPort,
    timeout: Duration,
) -> Result<DeviceHealth, SensorError> {
    port.clear(ClearBuffer::Input)?;
    send(port, CMD_GET_HEALTH, &[])?;
    read_descriptor(port, "health", timeout)?.require(ANS_TYPE_DEVHEALTH, HEALTH_LEN)?;
    let mut bytes = [0_u8; HEALTH_LEN];
    read_exact(port, &mut bytes, "health", timeout)?;
    parse_health(&bytes)
}
