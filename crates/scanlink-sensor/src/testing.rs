//! Scripted sensor double for tests in dependent crates.
//!
//! A [`SensorScript`] is shared between the test and every
//! [`ScriptedSensor`] its [`ScriptedConnector`] hands out, so the test can
//! change behaviour and inspect calls after the driver has been moved into a
//! handle.

use std::collections::VecDeque;
use std::sync::Arc;

use camino::Utf8Path;
use parking_lot::Mutex;

use crate::driver::{DeviceHealth, DeviceInfo, SensorConnector, SensorDriver, SensorError};
use crate::sample::{RawSample, angle_to_q14};

/// A call observed by a [`ScriptedSensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    /// `connect` on the connector.
    Connect,
    /// [`SensorDriver::health`].
    Health,
    /// [`SensorDriver::device_info`].
    DeviceInfo,
    /// [`SensorDriver::set_motor_speed`].
    SetMotorSpeed(u16),
    /// [`SensorDriver::start_scan`].
    StartScan {
        /// Force flag.
        force: bool,
        /// Typical-mode flag.
        use_typical_scan: bool,
    },
    /// [`SensorDriver::stop_scan`].
    StopScan,
    /// [`SensorDriver::grab_batch`].
    GrabBatch,
}

#[derive(Debug)]
struct ScriptState {
    refuse_connect: bool,
    health: Option<DeviceHealth>,
    info: Option<DeviceInfo>,
    fail_motor: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_grab: bool,
    require_scanning: bool,
    marks_rotation_start: bool,
    scanning: bool,
    batches: VecDeque<Vec<RawSample>>,
    rotation: Vec<RawSample>,
    calls: Vec<DriverCall>,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            refuse_connect: false,
            health: Some(DeviceHealth::ok()),
            info: Some(SensorScript::default_info()),
            fail_motor: false,
            fail_start: false,
            fail_stop: false,
            fail_grab: false,
            require_scanning: true,
            marks_rotation_start: false,
            scanning: false,
            batches: VecDeque::new(),
            rotation: SensorScript::rotation_of(&[0.0, 90.0, 180.0, 270.0]),
            calls: Vec::new(),
        }
    }
}

/// Shared, mutable behaviour of scripted sensors.
#[derive(Debug, Clone, Default)]
pub struct SensorScript {
    state: Arc<Mutex<ScriptState>>,
}

impl SensorScript {
    /// Creates a script for a healthy sensor that repeats a four-sample
    /// rotation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identification block reported unless overridden.
    #[must_use]
    pub const fn default_info() -> DeviceInfo {
        DeviceInfo {
            model: 0x18,
            firmware_version: 0x011D,
            hardware_version: 7,
            serial_number: [0; 16],
        }
    }

    /// Builds a rotation from bearings in degrees, flagging the first sample
    /// as the rotation start.
    #[must_use]
    pub fn rotation_of(degrees: &[f32]) -> Vec<RawSample> {
        degrees
            .iter()
            .enumerate()
            .map(|(index, angle)| {
                let sample = RawSample::new(angle_to_q14(*angle), 4_000, 47 << 2);
                if index == 0 { sample.with_sync() } else { sample }
            })
            .collect()
    }

    /// Builds a connector handing out sensors driven by this script.
    #[must_use]
    pub fn connector(&self) -> Arc<ScriptedConnector> {
        Arc::new(ScriptedConnector {
            script: self.clone(),
        })
    }

    /// Makes `connect` fail.
    pub fn refuse_connect(&self, refuse: bool) {
        self.state.lock().refuse_connect = refuse;
    }

    /// Sets the health report; `None` makes the query fail.
    pub fn set_health(&self, health: Option<DeviceHealth>) {
        self.state.lock().health = health;
    }

    /// Sets the identification block; `None` makes the query fail.
    pub fn set_info(&self, info: Option<DeviceInfo>) {
        self.state.lock().info = info;
    }

    /// Makes motor commands fail.
    pub fn fail_motor(&self, fail: bool) {
        self.state.lock().fail_motor = fail;
    }

    /// Makes `start_scan` fail.
    pub fn fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    /// Makes `stop_scan` fail.
    pub fn fail_stop(&self, fail: bool) {
        self.state.lock().fail_stop = fail;
    }

    /// Makes `grab_batch` fail.
    pub fn fail_grab(&self, fail: bool) {
        self.state.lock().fail_grab = fail;
    }

    /// Lets `grab_batch` deliver data while idle.
    pub fn allow_idle_grab(&self) {
        self.state.lock().require_scanning = false;
    }

    /// Makes the sensor report that it flags rotation starts.
    pub fn mark_rotation_starts(&self, marks: bool) {
        self.state.lock().marks_rotation_start = marks;
    }

    /// Queues batches delivered before the repeating rotation.
    pub fn push_batches(&self, batches: impl IntoIterator<Item = Vec<RawSample>>) {
        self.state.lock().batches.extend(batches);
    }

    /// Replaces the rotation delivered once queued batches run out.
    pub fn set_rotation(&self, rotation: Vec<RawSample>) {
        self.state.lock().rotation = rotation;
    }

    /// Returns `true` while a scripted sensor is scanning.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.state.lock().scanning
    }

    /// Calls observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    /// Number of observed calls equal to `call`.
    #[must_use]
    pub fn count(&self, call: DriverCall) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|seen| **seen == call)
            .count()
    }

    fn record(&self, call: DriverCall) -> parking_lot::MutexGuard<'_, ScriptState> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state
    }
}

fn scripted_failure(operation: &str) -> SensorError {
    SensorError::protocol(format!("scripted {operation} failure"))
}

/// Connector handing out [`ScriptedSensor`]s.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    script: SensorScript,
}

impl SensorConnector for ScriptedConnector {
    fn connect(
        &self,
        _port: &Utf8Path,
        _baudrate: u32,
    ) -> Result<Box<dyn SensorDriver>, SensorError> {
        let state = self.script.record(DriverCall::Connect);
        if state.refuse_connect {
            return Err(scripted_failure("connect"));
        }
        Ok(Box::new(ScriptedSensor {
            script: self.script.clone(),
        }))
    }
}

/// Sensor whose behaviour follows a [`SensorScript`].
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    script: SensorScript,
}

impl ScriptedSensor {
    /// Creates a sensor driven by `script`.
    #[must_use]
    pub const fn new(script: SensorScript) -> Self {
        Self { script }
    }
}

impl SensorDriver for ScriptedSensor {
    fn health(&mut self) -> Result<DeviceHealth, SensorError> {
        self.script
            .record(DriverCall::Health)
            .health
            .ok_or_else(|| scripted_failure("health"))
    }

    fn device_info(&mut self) -> Result<DeviceInfo, SensorError> {
        self.script
            .record(DriverCall::DeviceInfo)
            .info
            .ok_or_else(|| scripted_failure("device info"))
    }

    fn set_motor_speed(&mut self, speed: u16) -> Result<(), SensorError> {
        let state = self.script.record(DriverCall::SetMotorSpeed(speed));
        if state.fail_motor {
            return Err(scripted_failure("motor"));
        }
        Ok(())
    }

    fn start_scan(&mut self, force: bool, use_typical_scan: bool) -> Result<(), SensorError> {
        let mut state = self.script.record(DriverCall::StartScan {
            force,
            use_typical_scan,
        });
        if state.fail_start {
            return Err(scripted_failure("start"));
        }
        state.scanning = true;
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), SensorError> {
        let mut state = self.script.record(DriverCall::StopScan);
        state.scanning = false;
        if state.fail_stop {
            return Err(scripted_failure("stop"));
        }
        Ok(())
    }

    fn grab_batch(&mut self, capacity: usize) -> Result<Vec<RawSample>, SensorError> {
        let mut state = self.script.record(DriverCall::GrabBatch);
        if state.fail_grab {
            return Err(scripted_failure("grab"));
        }
        if state.require_scanning && !state.scanning {
            return Err(SensorError::NotScanning);
        }
        let mut batch = match state.batches.pop_front() {
            Some(batch) => batch,
            None => state.rotation.clone(),
        };
        batch.truncate(capacity);
        Ok(batch)
    }

    fn is_scanning(&self) -> bool {
        self.script.state.lock().scanning
    }

    fn marks_rotation_start(&self) -> bool {
        self.script.state.lock().marks_rotation_start
    }
}
