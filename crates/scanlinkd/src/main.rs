//! Entry point for the scan-session daemon.

use std::io::{self, Write};
use std::process::ExitCode;

use scanlink_config::{Config, ConfigError};

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => return report_config_error(error),
    };
    match scanlinkd::run_daemon(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr(), "scanlinkd: {error}");
            ExitCode::FAILURE
        }
    }
}

fn report_config_error(error: ConfigError) -> ExitCode {
    let informational = error.is_informational();
    match error {
        // Help and version go to stdout, usage errors to stderr.
        ConfigError::Arguments(clap_error) => {
            let _ = clap_error.print();
        }
        other => {
            let _ = writeln!(io::stderr(), "scanlinkd: {other}");
        }
    }
    if informational {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
