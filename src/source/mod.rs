//! Media sources: integrations that report what is currently playing.

mod media_control;
mod mpris;

pub use media_control::MediaControlSource;
pub use mpris::MprisSource;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::SourcesConfig;
use crate::error::Result;

/// What one source reports on one tick.
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub artists: Vec<String>,
    pub track: String,
    pub album: String,
    /// Total track length, when the player reports one.
    pub length: Option<Duration>,
    /// Elapsed position, when the player reports one.
    pub position: Option<Duration>,
    /// Play (true) vs. pause (false).
    pub playing: bool,
}

/// A media source the poller can query.
///
/// A failed poll is logged by the poller and treated as "nothing playing"
/// for that tick; it never stops the loop or affects other sources.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Query the source for its current snapshot; `None` means nothing is
    /// playing right now.
    async fn poll(&self) -> Result<Option<PlayerSnapshot>>;
}

/// Build every configured source. A source that fails to set up is logged
/// and skipped; zero sources is a warning, not an error.
pub async fn from_config(config: &SourcesConfig) -> Vec<Box<dyn Source>> {
    let mut sources: Vec<Box<dyn Source>> = Vec::new();

    if let Some(ref dbus) = config.dbus {
        debug!("setting up dbus source");
        match MprisSource::connect(&dbus.address).await {
            Ok(source) => sources.push(Box::new(source)),
            Err(e) => error!(address = %dbus.address, error = %e, "failed to connect to bus"),
        }
    }

    if let Some(ref media_control) = config.media_control {
        debug!("setting up media-control source");
        sources.push(Box::new(MediaControlSource::new(
            media_control.command.clone(),
            media_control.arguments.clone(),
        )));
    }

    if sources.is_empty() {
        warn!("no sources configured");
    }

    sources
}
