//! Check-config command implementation

use clap::Args;
use colored::Colorize;

use crate::settings::Settings;

/// Validate and print the effective configuration, secrets redacted
#[derive(Debug, Args)]
pub struct CheckConfigCommand {}

impl CheckConfigCommand {
    /// Execute the check-config command
    ///
    /// # Errors
    ///
    /// The first validation failure.
    pub fn execute(self, settings: &Settings) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
        settings.validate()?;
        eprintln!("{} configuration is valid", "✓".green().bold());
        Ok(())
    }
}
