//! Command keywords accepted on the wire.

/// Envelope command name used for the greeting sent on every new connection.
pub const CONNECT_COMMAND: &str = "CONNECT";

const START_SCAN: &str = "START_SCAN";
const GET_SAMPLE: &str = "GET_SAMPLE";
const STOP: &str = "STOP";
const GET_INFO: &str = "GET_INFO";
const GET_HEALTH: &str = "GET_HEALTH";

/// A single client command.
///
/// Keywords are matched exactly and case-sensitively. Anything else is kept
/// verbatim in [`Command::Unknown`] so it can be echoed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Spin up the motor and start streaming measurements.
    StartScan,
    /// Capture one full rotation.
    GetSample,
    /// Stop scanning and spin the motor down.
    Stop,
    /// Query model, firmware and hardware revisions.
    GetInfo,
    /// Query the sensor's self-reported health.
    GetHealth,
    /// Unrecognised text, preserved as received.
    Unknown(String),
}

impl Command {
    /// Parses a request line with its line terminator already removed.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line {
            START_SCAN => Self::StartScan,
            GET_SAMPLE => Self::GetSample,
            STOP => Self::Stop,
            GET_INFO => Self::GetInfo,
            GET_HEALTH => Self::GetHealth,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// Returns the name echoed in the response envelope.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::StartScan => START_SCAN,
            Self::GetSample => GET_SAMPLE,
            Self::Stop => STOP,
            Self::GetInfo => GET_INFO,
            Self::GetHealth => GET_HEALTH,
            Self::Unknown(text) => text.as_str(),
        }
    }
}
