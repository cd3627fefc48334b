//! Runs a daemon runtime on a loopback port for behaviour tests.

use std::net::SocketAddr;
use std::sync::Arc;

use scanlink_config::{Config, ListenEndpoint};
use scanlink_sensor::SensorConnector;
use scanlink_sensor::testing::SensorScript;

use super::RecordingHealthReporter;
use crate::process::{DaemonRuntime, ServiceDeps};

/// Configuration listening on an ephemeral loopback port.
///
/// The retry interval is long enough that the background monitor never
/// runs during a test; scenarios drive the driver handle directly. Captures
/// give up after half a second.
pub(crate) fn test_config() -> Config {
    let mut config = Config::new(115_200, "/dev/ttyUSB0");
    config.listen = ListenEndpoint::new("127.0.0.1", 0);
    config.retry_interval_secs = 600;
    config.capture_timeout_ms = 500;
    config
}

pub(crate) struct TestDaemon {
    pub(crate) script: SensorScript,
    pub(crate) reporter: Arc<RecordingHealthReporter>,
    runtime: Option<DaemonRuntime>,
}

/// Starts a runtime around `connector` with a recording reporter.
pub(crate) fn launch(
    connector: Arc<dyn SensorConnector>,
) -> (DaemonRuntime, Arc<RecordingHealthReporter>) {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let runtime = DaemonRuntime::start(
        &test_config(),
        ServiceDeps {
            connector,
            reporter: reporter.clone(),
        },
    )
    .expect("start daemon runtime");
    (runtime, reporter)
}

impl TestDaemon {
    /// Starts a daemon whose sensor follows `script`.
    pub(crate) fn start(script: SensorScript) -> Self {
        let (runtime, reporter) = launch(script.connector());
        Self {
            script,
            reporter,
            runtime: Some(runtime),
        }
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.runtime()
            .local_addr()
            .expect("runtime should report its address")
    }

    pub(crate) fn runtime(&self) -> &DaemonRuntime {
        self.runtime.as_ref().expect("runtime is running")
    }

    pub(crate) fn stop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.stop().expect("stop daemon runtime");
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = runtime.stop();
        }
    }
}
