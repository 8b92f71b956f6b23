//! Command-line interface
//!
//! ```text
//! soutu-server [-v|-q] [--config FILE] serve [--bind ADDR]
//! soutu-server [-v|-q] [--config FILE] issue --resource-id ID [--subject-id ID]
//! soutu-server [-v|-q] [--config FILE] check-config
//! ```

pub mod commands;
pub mod error;

use std::path::PathBuf;

use clap::Parser;

use crate::logging;
use crate::settings::Settings;

/// soutu-server - signed, rate-limited media delivery proxy
#[derive(Parser, Debug)]
#[command(
    name = "soutu-server",
    version,
    about = "Signed, rate-limited media delivery proxy for the soutu bot",
    author
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: commands::Command,

    /// Configuration file (.toml, .yaml, .yml or .json)
    #[arg(short, long, value_name = "FILE", global = true, env = "SOUTU_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Load configuration, install logging and run the command
    ///
    /// # Errors
    ///
    /// Configuration, start-up and command failures.
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = Settings::load(self.config.as_deref())?;

        let directive = logging::level_directive(self.verbose, self.quiet, &settings.logging.level);
        logging::init(&settings.logging, &directive)?;

        self.command.execute(settings).await
    }
}
