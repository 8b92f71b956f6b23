//! # soutu-server
//!
//! Composition root for the soutu media proxy: layered configuration,
//! logging, the Telegram collaborators and the axum server, behind a small
//! CLI.
//!
//! - [`settings`] - defaults, config file, `SOUTU_*` and legacy env vars
//! - [`logging`] - `tracing-subscriber` setup
//! - [`app`] - wiring of store, issuer, delivery handler and router
//! - [`cli`] - `serve`, `issue` and `check-config`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod cli;
pub mod logging;
pub mod settings;

pub use settings::{Settings, SettingsError};
