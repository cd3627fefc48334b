//! The running daemon: shared driver, monitor and command server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use scanlink_config::Config;
use scanlink_sensor::{DriverHandle, SharedDriver};

use crate::monitor::{AvailabilityMonitor, MonitorHandle};
use crate::session::{SessionHandler, SessionSettings};
use crate::transport::{ListenerHandle, SocketListener};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::launch::ServiceDeps;

/// Threads and shared state of a started daemon.
pub(crate) struct DaemonRuntime {
    shutdown: Arc<AtomicBool>,
    driver: SharedDriver,
    listener: ListenerHandle,
    monitor: MonitorHandle,
    local_addr: Option<SocketAddr>,
}

impl DaemonRuntime {
    /// Binds the endpoint, makes a first connection attempt and starts the
    /// monitor and listener threads.
    pub(crate) fn start(config: &Config, services: ServiceDeps) -> Result<Self, LaunchError> {
        let ServiceDeps {
            connector,
            reporter,
        } = services;
        let shutdown = Arc::new(AtomicBool::new(false));
        let driver = SharedDriver::new(DriverHandle::new(connector));

        let listener = SocketListener::bind(&config.listen)?;
        let local_addr = listener.local_addr();

        let monitor = AvailabilityMonitor::new(driver.clone(), config, Arc::clone(&reporter));
        let first = monitor.pass();
        info!(target: PROCESS_TARGET, ?first, "initial sensor pass complete");
        let monitor = monitor.start(Arc::clone(&shutdown))?;

        let handler = Arc::new(SessionHandler::new(
            driver.clone(),
            SessionSettings::from_config(config),
            Arc::clone(&reporter),
        ));
        let listener = match listener.start(handler, Arc::clone(&shutdown)) {
            Ok(listener) => listener,
            Err(error) => {
                monitor.shutdown();
                if let Err(join_error) = monitor.join() {
                    warn!(target: PROCESS_TARGET, error = %join_error, "monitor join failed");
                }
                return Err(error.into());
            }
        };
        reporter.daemon_ready(config);

        Ok(Self {
            shutdown,
            driver,
            listener,
            monitor,
            local_addr,
        })
    }

    /// Address the command server is bound to.
    pub(crate) const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Shared driver used by every session.
    #[cfg(test)]
    pub(crate) const fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Stops every thread, waits for them and releases the sensor.
    pub(crate) fn stop(self) -> Result<(), LaunchError> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.listener.shutdown();
        self.monitor.shutdown();
        let listener = self.listener.join();
        let monitor = self.monitor.join();
        self.driver.with_handle(DriverHandle::shutdown);
        info!(target: PROCESS_TARGET, "shutdown sequence completed");
        listener?;
        monitor?;
        Ok(())
    }
}
