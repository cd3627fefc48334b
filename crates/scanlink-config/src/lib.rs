//! Configuration for the scan-session daemon.
//!
//! Every option is accepted on the command line and from a `SCANLINK_*`
//! environment variable; command-line values win. Parsed values are
//! validated before they are handed to the daemon.

mod defaults;
mod endpoint;
mod logging;

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;

pub use defaults::{
    DEFAULT_CAPTURE_TIMEOUT_MS, DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT, DEFAULT_LOG_FILTER, DEFAULT_MOTOR_SPEED,
    DEFAULT_RETRY_INTERVAL_SECS, default_listen_endpoint, default_log_filter,
    default_log_filter_string, default_log_format, default_quality_mode, default_retry_interval,
};
pub use endpoint::{EndpointParseError, ListenEndpoint};
pub use logging::{LogFormat, LogFormatParseError};
pub use scanlink_protocol::QualityMode;

/// Runtime configuration for `scanlinkd`.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "scanlinkd",
    version,
    about = "Serve a spinning rangefinder over a line-delimited JSON/TCP protocol"
)]
pub struct Config {
    /// Serial baud rate of the sensor.
    #[arg(env = "SCANLINK_BAUDRATE", value_name = "BAUDRATE")]
    pub baudrate: u32,

    /// Serial device the sensor is attached to.
    #[arg(env = "SCANLINK_DEVICE", value_name = "PORT_PATH")]
    pub device: Utf8PathBuf,

    /// Address the command server listens on.
    #[arg(
        long,
        env = "SCANLINK_LISTEN",
        value_name = "URL",
        default_value_t = defaults::default_listen_endpoint()
    )]
    pub listen: ListenEndpoint,

    /// Tracing filter expression.
    #[arg(
        long,
        env = "SCANLINK_LOG_FILTER",
        value_name = "FILTER",
        default_value_t = defaults::default_log_filter_string()
    )]
    pub log_filter: String,

    /// Log output format (`json` or `compact`).
    #[arg(
        long,
        env = "SCANLINK_LOG_FORMAT",
        value_name = "FORMAT",
        default_value_t = defaults::default_log_format()
    )]
    pub log_format: LogFormat,

    /// Seconds between sensor reconnection attempts.
    #[arg(
        long,
        env = "SCANLINK_RETRY_INTERVAL_SECS",
        value_name = "SECONDS",
        default_value_t = defaults::DEFAULT_RETRY_INTERVAL_SECS
    )]
    pub retry_interval_secs: u64,

    /// Motor speed applied by `START_SCAN`.
    #[arg(
        long,
        env = "SCANLINK_MOTOR_SPEED",
        value_name = "SPEED",
        default_value_t = defaults::DEFAULT_MOTOR_SPEED
    )]
    pub motor_speed: u16,

    /// Milliseconds `GET_SAMPLE` waits for a full rotation.
    #[arg(
        long,
        env = "SCANLINK_CAPTURE_TIMEOUT_MS",
        value_name = "MILLISECONDS",
        default_value_t = defaults::DEFAULT_CAPTURE_TIMEOUT_MS
    )]
    pub capture_timeout_ms: u64,

    /// Quality representation in samples (`shifted` or `raw`).
    #[arg(
        long,
        env = "SCANLINK_QUALITY",
        value_name = "MODE",
        default_value_t = defaults::default_quality_mode()
    )]
    pub quality: QualityMode,

    /// Serve a simulated sensor instead of opening the serial device.
    #[arg(long, env = "SCANLINK_SIMULATE")]
    pub simulate: bool,
}

impl Config {
    /// Builds a configuration with default options for the given sensor.
    #[must_use]
    pub fn new(baudrate: u32, device: impl Into<Utf8PathBuf>) -> Self {
        Self {
            baudrate,
            device: device.into(),
            listen: defaults::default_listen_endpoint(),
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            retry_interval_secs: defaults::DEFAULT_RETRY_INTERVAL_SECS,
            motor_speed: defaults::DEFAULT_MOTOR_SPEED,
            capture_timeout_ms: defaults::DEFAULT_CAPTURE_TIMEOUT_MS,
            quality: defaults::default_quality_mode(),
            simulate: false,
        }
    }

    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when arguments fail to parse or validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list and the environment.
    ///
    /// The first item is treated as the binary name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when arguments fail to parse or validate.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants clap cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baudrate == 0 {
            return Err(ConfigError::ZeroBaudrate);
        }
        if self.device.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyDevice);
        }
        if self.retry_interval_secs == 0 {
            return Err(ConfigError::ZeroRetryInterval);
        }
        if self.capture_timeout_ms == 0 {
            return Err(ConfigError::ZeroCaptureTimeout);
        }
        Ok(())
    }

    /// Interval between availability monitor ticks.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Time one capture may take.
    #[must_use]
    pub const fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command line or environment values failed to parse.
    ///
    /// Also carries `--help` and `--version` requests.
    #[error(transparent)]
    Arguments(#[from] clap::Error),
    /// Baud rate was zero.
    #[error("baud rate must be greater than zero")]
    ZeroBaudrate,
    /// Device path was empty.
    #[error("sensor device path must not be empty")]
    EmptyDevice,
    /// Retry interval was zero.
    #[error("retry interval must be at least one second")]
    ZeroRetryInterval,
    /// Capture timeout was zero.
    #[error("capture timeout must be at least one millisecond")]
    ZeroCaptureTimeout,
}

impl ConfigError {
    /// Returns `true` when the error is a help or version request rather
    /// than a failure.
    #[must_use]
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            Self::Arguments(error) if matches!(
                error.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            )
        )
    }
}
