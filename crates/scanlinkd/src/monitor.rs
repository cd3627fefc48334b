//! Background supervision of the sensor connection.
//!
//! The monitor connects the sensor when none is held and releases an idle
//! sensor that stops reporting healthy, so the next pass reconnects it. A
//! streaming sensor is left alone; its health is only re-checked once the
//! scan stops.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use scanlink_config::Config;
use scanlink_sensor::{HealthCheck, SharedDriver};

use crate::health::HealthReporter;

const MONITOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::monitor");

/// Longest uninterrupted sleep between shutdown checks.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Errors surfaced by the monitor thread.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The monitor thread could not be spawned.
    #[error("failed to spawn monitor thread: {source}")]
    Spawn {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The monitor thread panicked.
    #[error("monitor thread panicked")]
    ThreadPanic,
}

/// What a single monitor pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MonitorPass {
    /// A healthy sensor was connected.
    Connected,
    /// Connecting failed or left the sensor unhealthy.
    Unavailable,
    /// The held sensor is healthy.
    Healthy,
    /// The held sensor is streaming and its health was not queried.
    Scanning,
    /// The held sensor stopped reporting healthy and was released.
    Released,
}

/// Keeps the shared driver connected.
pub(crate) struct AvailabilityMonitor {
    driver: SharedDriver,
    device: Utf8PathBuf,
    baudrate: u32,
    interval: Duration,
    reporter: Arc<dyn HealthReporter>,
}

impl AvailabilityMonitor {
    pub(crate) fn new(
        driver: SharedDriver,
        config: &Config,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            driver,
            device: config.device.clone(),
            baudrate: config.baudrate,
            interval: config.retry_interval(),
            reporter,
        }
    }

    /// Runs one supervision pass under the driver lock.
    pub(crate) fn pass(&self) -> MonitorPass {
        self.driver.with_handle(|handle| {
            if !handle.is_connected() {
                return match handle.initialize(&self.device, self.baudrate) {
                    Ok(()) => {
                        self.reporter.sensor_connected(&self.device, self.baudrate);
                        MonitorPass::Connected
                    }
                    Err(error) => {
                        self.reporter.sensor_unavailable(&error);
                        MonitorPass::Unavailable
                    }
                };
            }
            if handle.is_scanning() {
                return MonitorPass::Scanning;
            }
            match handle.check_health() {
                HealthCheck::Healthy => MonitorPass::Healthy,
                HealthCheck::Unhealthy | HealthCheck::Unavailable => {
                    handle.shutdown();
                    self.reporter.sensor_released();
                    MonitorPass::Released
                }
            }
        })
    }

    /// Starts supervising on a background thread until `shutdown` is raised.
    ///
    /// The first pass runs one interval after start; call [`Self::pass`]
    /// beforehand for an immediate attempt.
    pub(crate) fn start(self, shutdown: Arc<AtomicBool>) -> Result<MonitorHandle, MonitorError> {
        let handle = thread::Builder::new()
            .name("scanlink-monitor".to_owned())
            .spawn({
                let shutdown = Arc::clone(&shutdown);
                move || self.run(&shutdown)
            })
            .map_err(|source| MonitorError::Spawn { source })?;
        Ok(MonitorHandle {
            shutdown,
            handle: Some(handle),
        })
    }

    fn run(&self, shutdown: &AtomicBool) {
        info!(
            target: MONITOR_TARGET,
            device = %self.device,
            baudrate = self.baudrate,
            interval_ms = self.interval.as_millis(),
            "availability monitor started"
        );
        loop {
            sleep_unless_shutdown(self.interval, shutdown);
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            let pass = self.pass();
            debug!(target: MONITOR_TARGET, ?pass, "monitor pass complete");
        }
        info!(target: MONITOR_TARGET, "availability monitor stopped");
    }
}

fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !shutdown.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

/// Handle to the monitor thread.
#[derive(Debug)]
pub(crate) struct MonitorHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Requests shutdown. Safe to call repeatedly.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub(crate) fn join(mut self) -> Result<(), MonitorError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| MonitorError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
