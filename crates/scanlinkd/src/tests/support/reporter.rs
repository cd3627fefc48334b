//! Test double for [`HealthReporter`] that records structured events for
//! assertions.

use std::sync::{Mutex, PoisonError};

use camino::Utf8Path;
use scanlink_config::Config;
use scanlink_sensor::SensorError;

use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    DaemonReady,
    SensorConnected(String),
    SensorUnavailable(String),
    SensorReleased,
    ClientConnected { sensor_ready: bool },
    ClientDisconnected { commands: usize },
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn daemon_ready(&self, _config: &Config) {
        self.record(HealthEvent::DaemonReady);
    }

    fn sensor_connected(&self, device: &Utf8Path, _baudrate: u32) {
        self.record(HealthEvent::SensorConnected(device.to_string()));
    }

    fn sensor_unavailable(&self, error: &SensorError) {
        self.record(HealthEvent::SensorUnavailable(error.to_string()));
    }

    fn sensor_released(&self) {
        self.record(HealthEvent::SensorReleased);
    }

    fn client_connected(&self, _peer: &str, sensor_ready: bool) {
        self.record(HealthEvent::ClientConnected { sensor_ready });
    }

    fn client_disconnected(&self, _peer: &str, commands: usize) {
        self.record(HealthEvent::ClientDisconnected { commands });
    }
}
