//! Ownership of the single sensor connection.
//!
//! [`DriverHandle`] owns at most one connected driver and tracks whether it
//! is fit for scanning. [`SharedDriver`] wraps it in the one mutex through
//! which every thread reaches the sensor.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use camino::Utf8Path;
use tracing::{info, warn};

use crate::driver::{SensorConnector, SensorDriver, SensorError};

const HANDLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handle");

/// Connection state of a [`DriverHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// No driver is held.
    Disconnected,
    /// A driver is held but reports a fault.
    ConnectedUnhealthy,
    /// A driver is held and fit for scanning.
    ConnectedHealthy,
}

/// Outcome of [`DriverHandle::check_health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheck {
    /// The driver reports no internal error.
    Healthy,
    /// The driver reports an internal error or the query failed.
    Unhealthy,
    /// No driver is held.
    Unavailable,
}

/// Owner of the sensor connection.
pub struct DriverHandle {
    connector: Arc<dyn SensorConnector>,
    driver: Option<Box<dyn SensorDriver>>,
    state: HandleState,
}

impl fmt::Debug for DriverHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DriverHandle")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DriverHandle {
    /// Creates a disconnected handle that connects through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn SensorConnector>) -> Self {
        Self {
            connector,
            driver: None,
            state: HandleState::Disconnected,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> HandleState {
        self.state
    }

    /// Connects to the sensor and checks its health.
    ///
    /// Any previously held driver is shut down first. When the connection
    /// succeeds but the sensor is unhealthy, the driver is retained in the
    /// [`HandleState::ConnectedUnhealthy`] state so that [`Self::shutdown`]
    /// can stop it.
    ///
    /// # Errors
    ///
    /// Returns the connection error, or [`SensorError::Unhealthy`] when the
    /// sensor reports a fault.
    pub fn initialize(&mut self, port: &Utf8Path, baudrate: u32) -> Result<(), SensorError> {
        self.shutdown();
        let mut driver = self.connector.connect(port, baudrate)?;
        info!(
            target: HANDLE_TARGET,
            port = %port,
            baudrate,
            "sensor connected"
        );
        let health = driver.health();
        self.driver = Some(driver);

        match health {
            Ok(health) if health.is_operational() => {
                self.state = HandleState::ConnectedHealthy;
                Ok(())
            }
            Ok(health) => {
                self.state = HandleState::ConnectedUnhealthy;
                Err(SensorError::Unhealthy {
                    error_code: health.error_code,
                })
            }
            Err(error) => {
                self.state = HandleState::ConnectedUnhealthy;
                Err(error)
            }
        }
    }

    /// Re-evaluates the held driver's health.
    ///
    /// Updates the recorded state but never connects or disconnects.
    pub fn check_health(&mut self) -> HealthCheck {
        let Some(driver) = self.driver.as_mut() else {
            self.state = HandleState::Disconnected;
            return HealthCheck::Unavailable;
        };
        match driver.health() {
            Ok(health) if health.is_operational() => {
                self.state = HandleState::ConnectedHealthy;
                HealthCheck::Healthy
            }
            Ok(health) => {
                warn!(
                    target: HANDLE_TARGET,
                    error_code = health.error_code,
                    "sensor reports internal error"
                );
                self.state = HandleState::ConnectedUnhealthy;
                HealthCheck::Unhealthy
            }
            Err(error) => {
                warn!(
                    target: HANDLE_TARGET,
                    error = %error,
                    "sensor health query failed"
                );
                self.state = HandleState::ConnectedUnhealthy;
                HealthCheck::Unhealthy
            }
        }
    }

    /// Stops the sensor and releases the driver. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            self.state = HandleState::Disconnected;
            return;
        };
        if let Err(error) = driver.stop_scan() {
            warn!(target: HANDLE_TARGET, error = %error, "failed to stop scan during shutdown");
        }
        if let Err(error) = driver.set_motor_speed(0) {
            warn!(target: HANDLE_TARGET, error = %error, "failed to stop motor during shutdown");
        }
        drop(driver);
        self.state = HandleState::Disconnected;
        info!(target: HANDLE_TARGET, "sensor released");
    }

    /// Returns the held driver, whatever its health.
    pub fn driver(&mut self) -> Option<&mut dyn SensorDriver> {
        match self.driver {
            Some(ref mut driver) => Some(driver.as_mut()),
            None => None,
        }
    }

    /// Returns the held driver only while it is fit for scanning.
    pub fn scanner(&mut self) -> Option<&mut dyn SensorDriver> {
        match self.state {
            HandleState::ConnectedHealthy => self.driver(),
            HandleState::ConnectedUnhealthy | HandleState::Disconnected => None,
        }
    }

    /// Returns `true` when a driver is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.driver.is_some()
    }

    /// Returns `true` when a driver is held and currently streaming.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.driver.as_ref().is_some_and(|driver| driver.is_scanning())
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Process-wide access point for the sensor.
///
/// Every connect, disconnect and sensor command happens while holding the
/// inner lock, so transitions are serialised across threads.
#[derive(Debug, Clone)]
pub struct SharedDriver {
    inner: Arc<Mutex<DriverHandle>>,
}

impl SharedDriver {
    /// Wraps a handle for sharing between threads.
    #[must_use]
    pub fn new(handle: DriverHandle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(handle)),
        }
    }

    /// Executes a closure with exclusive access to the handle.
    ///
    /// A poisoned lock is recovered: every handle mutation leaves the state
    /// and the held driver consistent before it can panic.
    pub fn with_handle<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut DriverHandle) -> R,
    {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| {
            warn!(target: HANDLE_TARGET, "recovering poisoned sensor lock");
            PoisonError::into_inner(poisoned)
        });
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mockall::mock;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::driver::{DeviceHealth, DeviceInfo};
    use crate::sample::RawSample;

    mock! {
        Driver {}

        impl SensorDriver for Driver {
            fn health(&mut self) -> Result<DeviceHealth, SensorError>;
            fn device_info(&mut self) -> Result<DeviceInfo, SensorError>;
            fn set_motor_speed(&mut self, speed: u16) -> Result<(), SensorError>;
            fn start_scan(&mut self, force: bool, use_typical_scan: bool) -> Result<(), SensorError>;
            fn stop_scan(&mut self) -> Result<(), SensorError>;
            fn grab_batch(&mut self, capacity: usize) -> Result<Vec<RawSample>, SensorError>;
            fn is_scanning(&self) -> bool;
        }
    }

    /// Hands out one prepared driver per `connect` call.
    struct QueueConnector {
        drivers: Mutex<Vec<MockDriver>>,
        attempts: AtomicUsize,
    }

    impl QueueConnector {
        fn new(drivers: Vec<MockDriver>) -> Arc<Self> {
            Arc::new(Self {
                drivers: Mutex::new(drivers),
                attempts: AtomicUsize::new(0),
            })
        }
    }

    impl SensorConnector for QueueConnector {
        fn connect(
            &self,
            _port: &Utf8Path,
            _baudrate: u32,
        ) -> Result<Box<dyn SensorDriver>, SensorError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.drivers.lock().expect("drivers lock").pop() {
                Some(driver) => Ok(Box::new(driver)),
                None => Err(SensorError::Io(std::io::ErrorKind::NotFound.into())),
            }
        }
    }

    fn driver_with_health(health: DeviceHealth) -> MockDriver {
        let mut driver = MockDriver::new();
        driver.expect_health().returning(move || Ok(health));
        driver
    }

    fn expect_release(driver: &mut MockDriver) {
        driver.expect_stop_scan().times(1).returning(|| Ok(()));
        driver
            .expect_set_motor_speed()
            .withf(|speed| *speed == 0)
            .times(1)
            .returning(|_| Ok(()));
    }

    #[fixture]
    fn port() -> &'static Utf8Path {
        Utf8Path::new("/dev/ttyUSB0")
    }

    #[rstest]
    fn initialize_healthy_sensor(port: &'static Utf8Path) {
        let mut driver = driver_with_health(DeviceHealth::ok());
        expect_release(&mut driver);
        let mut handle = DriverHandle::new(QueueConnector::new(vec![driver]));

        handle.initialize(port, 115_200).expect("initialize");

        assert_eq!(handle.state(), HandleState::ConnectedHealthy);
        assert!(handle.scanner().is_some());
    }

    #[rstest]
    fn connect_failure_keeps_nothing(port: &'static Utf8Path) {
        let mut handle = DriverHandle::new(QueueConnector::new(Vec::new()));

        assert!(handle.initialize(port, 115_200).is_err());
        assert_eq!(handle.state(), HandleState::Disconnected);
        assert!(handle.driver().is_none());
    }

    #[rstest]
    fn unhealthy_sensor_is_retained_but_not_scannable(port: &'static Utf8Path) {
        let mut driver = driver_with_health(DeviceHealth::error(0x42));
        expect_release(&mut driver);
        let mut handle = DriverHandle::new(QueueConnector::new(vec![driver]));

        let error = handle.initialize(port, 115_200).expect_err("unhealthy");

        assert!(matches!(error, SensorError::Unhealthy { error_code: 0x42 }));
        assert_eq!(handle.state(), HandleState::ConnectedUnhealthy);
        assert!(handle.driver().is_some());
        assert!(handle.scanner().is_none());
    }

    #[rstest]
    fn check_health_reports_each_outcome(port: &'static Utf8Path) {
        let mut handle = DriverHandle::new(QueueConnector::new(Vec::new()));
        assert_eq!(handle.check_health(), HealthCheck::Unavailable);

        let mut driver = MockDriver::new();
        let mut calls = 0;
        driver.expect_health().returning(move || {
            calls += 1;
            match calls {
                1 | 2 => Ok(DeviceHealth::ok()),
                3 => Ok(DeviceHealth::error(7)),
                _ => Err(SensorError::protocol("garbled")),
            }
        });
        expect_release(&mut driver);
        let mut handle = DriverHandle::new(QueueConnector::new(vec![driver]));
        handle.initialize(port, 115_200).expect("initialize");

        assert_eq!(handle.check_health(), HealthCheck::Healthy);
        assert_eq!(handle.check_health(), HealthCheck::Unhealthy);
        assert_eq!(handle.state(), HandleState::ConnectedUnhealthy);
        assert_eq!(handle.check_health(), HealthCheck::Unhealthy);
        assert!(handle.is_connected());
    }

    #[rstest]
    fn shutdown_is_idempotent(port: &'static Utf8Path) {
        let mut driver = driver_with_health(DeviceHealth::ok());
        expect_release(&mut driver);
        let mut handle = DriverHandle::new(QueueConnector::new(vec![driver]));
        handle.initialize(port, 115_200).expect("initialize");

        handle.shutdown();
        handle.shutdown();

        assert_eq!(handle.state(), HandleState::Disconnected);
        assert!(!handle.is_connected());
    }

    #[rstest]
    fn reinitialize_releases_previous_driver(port: &'static Utf8Path) {
        let mut first = driver_with_health(DeviceHealth::ok());
        expect_release(&mut first);
        let mut second = driver_with_health(DeviceHealth::ok());
        expect_release(&mut second);
        let connector = QueueConnector::new(vec![second, first]);
        let mut handle = DriverHandle::new(connector.clone());

        handle.initialize(port, 115_200).expect("first initialize");
        handle.initialize(port, 115_200).expect("second initialize");

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_driver_recovers_from_poisoning() {
        let shared = SharedDriver::new(DriverHandle::new(QueueConnector::new(Vec::new())));
        let clone = shared.clone();
        let outcome = std::thread::spawn(move || {
            clone.with_handle(|_| panic!("poison the lock"));
        })
        .join();
        assert!(outcome.is_err());

        let state = shared.with_handle(|handle| handle.state());
        assert_eq!(state, HandleState::Disconnected);
    }
}
