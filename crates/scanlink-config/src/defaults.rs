use std::time::Duration;

use scanlink_protocol::QualityMode;

use crate::endpoint::ListenEndpoint;
use crate::logging::LogFormat;

/// Default host the command server binds.
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";

/// Default TCP port for the command server.
pub const DEFAULT_LISTEN_PORT: u16 = 8002;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Seconds the availability monitor waits between connection attempts.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// Motor speed applied when scanning starts.
pub const DEFAULT_MOTOR_SPEED: u16 = 600;

/// Milliseconds one `GET_SAMPLE` may wait for a full rotation.
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 5_000;

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. clap).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default quality representation in sample payloads.
#[must_use]
pub fn default_quality_mode() -> QualityMode {
    QualityMode::Shifted
}

/// Default availability monitor interval.
#[must_use]
pub const fn default_retry_interval() -> Duration {
    Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS)
}

/// Computes the default listen endpoint for the daemon.
#[must_use]
pub fn default_listen_endpoint() -> ListenEndpoint {
    ListenEndpoint::new(DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT)
}
