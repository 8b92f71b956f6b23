//! Logging initialization
//!
//! Logs go to stderr. The filter comes from `RUST_LOG` when set, otherwise
//! from the CLI verbosity flags, otherwise from `logging.level`.

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::settings::{LogFormat, LoggingSettings};

/// Filter directive for the given CLI verbosity
///
/// `quiet` wins over any `-v`. Without flags, `configured` is used.
#[must_use]
pub fn level_directive(verbose: u8, quiet: bool, configured: &str) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init(settings: &LoggingSettings, directive: &str) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let subscriber = tracing_subscriber::registry().with(filter);

    match settings.format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .try_init(),
    }
    .map_err(|e| io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive(0, false, "warn"), "warn");
        assert_eq!(level_directive(1, false, "warn"), "debug");
        assert_eq!(level_directive(3, false, "warn"), "trace");
        assert_eq!(level_directive(2, true, "warn"), "error");
    }
}
