//! Structured health reporting for sensor and client lifecycle events.

use std::sync::Arc;

use camino::Utf8Path;
use scanlink_config::Config;
use scanlink_sensor::SensorError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked once the daemon has bound its endpoint and is serving.
    fn daemon_ready(&self, config: &Config);

    /// Invoked when the monitor connects a healthy sensor.
    fn sensor_connected(&self, device: &Utf8Path, baudrate: u32);

    /// Invoked when a connection attempt fails or leaves the sensor unhealthy.
    fn sensor_unavailable(&self, error: &SensorError);

    /// Invoked when the monitor releases a sensor that stopped reporting
    /// healthy.
    fn sensor_released(&self);

    /// Invoked after the greeting has been sent to a new client.
    fn client_connected(&self, peer: &str, sensor_ready: bool);

    /// Invoked when a client session ends.
    fn client_disconnected(&self, peer: &str, commands: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn daemon_ready(&self, config: &Config) {
        (**self).daemon_ready(config);
    }

    fn sensor_connected(&self, device: &Utf8Path, baudrate: u32) {
        (**self).sensor_connected(device, baudrate);
    }

    fn sensor_unavailable(&self, error: &SensorError) {
        (**self).sensor_unavailable(error);
    }

    fn sensor_released(&self) {
        (**self).sensor_released();
    }

    fn client_connected(&self, peer: &str, sensor_ready: bool) {
        (**self).client_connected(peer, sensor_ready);
    }

    fn client_disconnected(&self, peer: &str, commands: usize) {
        (**self).client_disconnected(peer, commands);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn daemon_ready(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_ready",
            listen = %config.listen,
            device = %config.device,
            baudrate = config.baudrate,
            simulate = config.simulate,
            log_format = %config.log_format(),
            "daemon ready"
        );
    }

    fn sensor_connected(&self, device: &Utf8Path, baudrate: u32) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "sensor_connected",
            device = %device,
            baudrate,
            "sensor connected and healthy"
        );
    }

    fn sensor_unavailable(&self, error: &SensorError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "sensor_unavailable",
            error = %error,
            "sensor unavailable"
        );
    }

    fn sensor_released(&self) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "sensor_released",
            "released unhealthy sensor"
        );
    }

    fn client_connected(&self, peer: &str, sensor_ready: bool) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "client_connected",
            peer,
            sensor_ready,
            "client connected"
        );
    }

    fn client_disconnected(&self, peer: &str, commands: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "client_disconnected",
            peer,
            commands,
            "client disconnected"
        );
    }
}
