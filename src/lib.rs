//! # scrobbled
//!
//! A multi-source music scrobbler daemon.
//!
//! This crate provides:
//! - Media sources: MPRIS over D-Bus and a media-info CLI
//! - Scrobbling rules: minimum play duration / percent thresholds per session
//! - Metadata normalization: blacklist and ordered regex rewrite rules
//! - Sinks: the last.fm API and a local CSV file, with per-sink failure
//!   isolation

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod notify;
pub mod poller;
pub mod scrobble;
pub mod session;
pub mod sink;
pub mod source;
pub mod transform;

pub use config::Config;
pub use error::{Error, Result};
pub use scrobble::Scrobble;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "scrobbled";
