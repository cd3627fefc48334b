//! Scan-session daemon for a spinning laser rangefinder.
//!
//! `scanlinkd` owns the one sensor attached to the host and serves it to any
//! number of TCP clients. Each client is greeted with the sensor's readiness
//! and then sends newline-terminated command keywords (`START_SCAN`,
//! `GET_SAMPLE`, `STOP`, `GET_INFO`, `GET_HEALTH`); every command is answered
//! with one JSON line of the form `{"command": ..., "response": ...}`.
//!
//! The daemon runs three kinds of threads: an accept loop, one thread per
//! client session and an availability monitor that reconnects the sensor
//! after it disappears or reports a fault. All of them reach the sensor
//! through a single shared driver lock, and all of them observe the same
//! shutdown flag so [`run_daemon`] can stop and join them before releasing
//! the sensor.

mod health;
mod monitor;
mod process;
mod session;
mod telemetry;
mod transport;

pub use health::{HealthReporter, StructuredHealthReporter};
pub use monitor::MonitorError;
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
