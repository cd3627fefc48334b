//! Test harness utilities for the daemon behaviour suites.

mod client;
mod daemon;
mod reporter;

pub(crate) use client::TestClient;
pub(crate) use daemon::{TestDaemon, launch, test_config};
pub(crate) use reporter::{HealthEvent, RecordingHealthReporter};
