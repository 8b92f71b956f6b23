//! Issue command implementation

use clap::{Args, ValueEnum};
use serde_json::json;
use tracing::warn;

use crate::app::build_services;
use crate::settings::{Settings, StoreBackend};

/// How the issued link is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum IssueOutput {
    /// The URL alone
    #[default]
    Url,
    /// URL, expiry and search links as JSON
    Json,
}

/// Mint a signed link and print it
///
/// The token is written to the configured store, so a running server only
/// honours the link when both share the Redis backend.
#[derive(Debug, Args)]
pub struct IssueCommand {
    /// Provider file id to grant access to
    #[arg(long, value_name = "ID")]
    pub resource_id: String,

    /// Subject the link is issued to
    #[arg(long, value_name = "ID", default_value = "")]
    pub subject_id: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = IssueOutput::Url)]
    pub output: IssueOutput,
}

impl IssueCommand {
    /// Execute the issue command
    ///
    /// # Errors
    ///
    /// Configuration and store failures.
    pub async fn execute(self, settings: &Settings) -> anyhow::Result<()> {
        if settings.store.backend == StoreBackend::Memory {
            warn!("memory store: the token dies with this process, no server will accept the link");
        }
        let services = build_services(settings).await?;
        let link = services
            .issuer
            .issue(&self.resource_id, &self.subject_id)
            .await?;

        match self.output {
            IssueOutput::Url => println!("{}", link.url),
            IssueOutput::Json => {
                let search_links = link.search_links();
                let shown = json!({
                    "url": link.url,
                    "expires_at": link.expires_at,
                    "search_links": search_links,
                });
                println!("{}", serde_json::to_string_pretty(&shown)?);
            }
        }
        Ok(())
    }
}
