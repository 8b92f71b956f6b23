//! # soutu-telegram - Telegram Bot API collaborator
//!
//! The proxy core knows media only by an opaque resource id. This crate
//! supplies the two provider-facing pieces it needs for Telegram:
//!
//! - [`TelegramClient`] wraps Bot API method calls and resolves a `file_id`
//!   to a download path through `getFile` ([`soutu_proxy::location::PathResolver`])
//! - [`TelegramFileFetcher`] downloads `/file/bot<token>/<path>`
//!   ([`soutu_proxy::upstream::UpstreamFetcher`])
//!
//! With mock mode on, Bot API calls are answered locally. File downloads
//! are never mocked.
//!
//! ```no_run
//! use soutu_telegram::{TelegramClient, TelegramConfig};
//!
//! # async fn run() -> soutu_telegram::TelegramResult<()> {
//! let client = TelegramClient::new(TelegramConfig::default().with_bot_token("123:abc"))?;
//! let file = client.get_file("AgACAgIAAxkBAAI").await?;
//! println!("{:?}", file.file_path);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;

pub use client::{FileInfo, TelegramClient};
pub use config::{DEFAULT_API_BASE, TelegramConfig, mock_flag_enabled};
pub use error::{TelegramError, TelegramResult};
pub use fetcher::TelegramFileFetcher;
