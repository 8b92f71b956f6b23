//! User-friendly error formatting for the CLI

use colored::Colorize;
use soutu_proxy::ProxyError;

use crate::settings::SettingsError;

fn suggestion(error: &anyhow::Error) -> Option<&'static str> {
    if let Some(settings) = error.downcast_ref::<SettingsError>() {
        return Some(match settings {
            SettingsError::FileNotFound(_) | SettingsError::UnsupportedFormat => {
                "Pass an existing .toml, .yaml or .json file with --config"
            }
            SettingsError::Parse(_) => "Check value types; durations are whole seconds",
            SettingsError::Invalid(_) => "Run `soutu-server check-config` to see the effective values",
        });
    }
    match error.downcast_ref::<ProxyError>() {
        Some(ProxyError::Configuration { .. }) => {
            Some("Set TG_PROXY_SECRET (or BOT_TOKEN) and check the configuration file")
        }
        Some(ProxyError::Storage { .. }) => Some("Check that the Redis server is reachable"),
        _ => None,
    }
}

/// Format an error and its causes for display
#[must_use]
pub fn format_error(error: &anyhow::Error) -> String {
    let mut out = format!("{} {}", "✗".red().bold(), error);
    for cause in error.chain().skip(1) {
        out.push_str(&format!("\n  caused by: {cause}"));
    }
    if let Some(hint) = suggestion(error) {
        out.push_str(&format!("\n\n{}\n  {}", "Suggestion:".yellow(), hint));
    }
    out
}

/// Display an error to stderr and return the exit code
#[must_use]
pub fn display_error(error: &anyhow::Error) -> i32 {
    eprintln!("{}", format_error(error));
    1
}
