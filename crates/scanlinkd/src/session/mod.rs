//! Per-connection command sessions.
//!
//! A session greets the client with the sensor's readiness, then answers one
//! command per line, in order, until the client leaves or the daemon shuts
//! down. Every sensor access goes through the shared driver lock.

mod commands;

use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::{debug, warn};

use scanlink_config::Config;
use scanlink_protocol::{Command, QualityMode, ResponseEnvelope};
use scanlink_sensor::{HealthCheck, RotationCapture, SharedDriver};

use crate::health::HealthReporter;
use crate::transport::{ConnectionHandler, LineReader, ResponseWriter};

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Options applied to every command a session runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionSettings {
    quality: QualityMode,
    motor_speed: u16,
    capture: RotationCapture,
}

impl SessionSettings {
    pub(crate) const fn new(
        quality: QualityMode,
        motor_speed: u16,
        capture: RotationCapture,
    ) -> Self {
        Self {
            quality,
            motor_speed,
            capture,
        }
    }

    pub(crate) fn from_config(config: &Config) -> Self {
        Self::new(
            config.quality,
            config.motor_speed,
            RotationCapture::new().with_timeout(config.capture_timeout()),
        )
    }
}

/// Serves the command protocol on accepted connections.
pub(crate) struct SessionHandler {
    driver: SharedDriver,
    settings: SessionSettings,
    reporter: Arc<dyn HealthReporter>,
}

impl SessionHandler {
    pub(crate) fn new(
        driver: SharedDriver,
        settings: SessionSettings,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            driver,
            settings,
            reporter,
        }
    }

    fn serve(
        &self,
        stream: &TcpStream,
        peer: &str,
        shutdown: &AtomicBool,
        served: &mut usize,
    ) -> io::Result<()> {
        let mut writer = ResponseWriter::new(stream);
        let ready = self
            .driver
            .with_handle(|handle| handle.check_health() == HealthCheck::Healthy);
        writer.write_message(&ResponseEnvelope::connect(ready))?;
        self.reporter.client_connected(peer, ready);
        if !ready {
            return Ok(());
        }

        let mut input = stream;
        let mut lines = LineReader::new();
        while let Some(line) = lines.next_line(&mut input, shutdown)? {
            let command = Command::parse(&line);
            debug!(target: SESSION_TARGET, peer, command = command.name(), "command received");
            let envelope = self.driver.with_handle(|handle| {
                commands::execute(handle, &command, &self.settings, shutdown)
            });
            writer.write_message(&envelope)?;
            *served += 1;
        }
        Ok(())
    }
}

impl ConnectionHandler for SessionHandler {
    fn handle(&self, stream: TcpStream, shutdown: &AtomicBool) {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_owned(), |addr| addr.to_string());
        let mut served = 0;
        if let Err(error) = self.serve(&stream, &peer, shutdown, &mut served) {
            warn!(target: SESSION_TARGET, peer = %peer, error = %error, "session ended with error");
        }
        self.reporter.client_disconnected(&peer, served);
    }
}
