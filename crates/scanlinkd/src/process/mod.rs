//! Daemon lifecycle: startup sequencing, signal handling and teardown.

mod errors;
mod launch;
mod runtime;
mod shutdown;

pub use errors::LaunchError;
pub use launch::run_daemon;
#[cfg(test)]
pub(crate) use launch::{LaunchPlan, ServiceDeps, run_daemon_with};
#[cfg(test)]
pub(crate) use runtime::DaemonRuntime;
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
