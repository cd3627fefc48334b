//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::info;

use scanlink_config::Config;
use scanlink_sensor::SensorConnector;
use scanlink_sensor::rplidar::RplidarConnector;
use scanlink_sensor::simulated::SimulatedConnector;

use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::telemetry;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::runtime::DaemonRuntime;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Service dependencies required to construct the daemon runtime.
pub(crate) struct ServiceDeps {
    pub(crate) connector: Arc<dyn SensorConnector>,
    pub(crate) reporter: Arc<dyn HealthReporter>,
}

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<S> {
    pub(crate) shutdown: S,
    pub(crate) services: ServiceDeps,
}

/// Runs the daemon with the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// Returns [`LaunchError`] when telemetry cannot be installed, the endpoint
/// cannot be bound, signal handlers cannot be installed, or a worker thread
/// panics.
pub fn run_daemon(config: &Config) -> Result<(), LaunchError> {
    telemetry::initialise(config)?;
    let connector: Arc<dyn SensorConnector> = if config.simulate {
        Arc::new(SimulatedConnector::new())
    } else {
        Arc::new(RplidarConnector::new())
    };
    let plan = LaunchPlan {
        shutdown: SystemShutdownSignal::new(),
        services: ServiceDeps {
            connector,
            reporter: Arc::new(StructuredHealthReporter::new()),
        },
    };
    run_daemon_with(config, plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<S>(config: &Config, plan: LaunchPlan<S>) -> Result<(), LaunchError>
where
    S: ShutdownSignal,
{
    let LaunchPlan { shutdown, services } = plan;
    info!(
        target: PROCESS_TARGET,
        listen = %config.listen,
        device = %config.device,
        simulate = config.simulate,
        "starting daemon runtime"
    );
    let runtime = DaemonRuntime::start(config, services)?;
    let waited = shutdown.wait();
    let stopped = runtime.stop();
    waited?;
    stopped
}
