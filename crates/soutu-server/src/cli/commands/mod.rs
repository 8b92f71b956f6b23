//! CLI command implementations

pub mod check_config;
pub mod issue;
pub mod serve;

use clap::Subcommand;

use crate::settings::Settings;

/// All available CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    #[command(visible_alias = "s")]
    Serve(serve::ServeCommand),

    /// Mint a signed link and print it
    #[command(visible_alias = "i")]
    Issue(issue::IssueCommand),

    /// Validate and print the effective configuration
    CheckConfig(check_config::CheckConfigCommand),
}

impl Command {
    /// Execute the command with the loaded settings
    ///
    /// # Errors
    ///
    /// Whatever the command fails with.
    pub async fn execute(self, settings: Settings) -> anyhow::Result<()> {
        match self {
            Command::Serve(cmd) => cmd.execute(settings).await,
            Command::Issue(cmd) => cmd.execute(&settings).await,
            Command::CheckConfig(cmd) => cmd.execute(&settings),
        }
    }
}
