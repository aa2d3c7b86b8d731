//! Sinks: destinations that record now-playing and scrobble events and can
//! list past scrobbles.

mod csv;
mod lastfm;

pub use csv::CsvSink;
pub use lastfm::LastFmSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::config::SinksConfig;
use crate::error::Result;
use crate::scrobble::Scrobble;

/// A destination for play events.
///
/// Failures are isolated per sink by the dispatcher; a sink error never
/// affects other sinks or the poll loop.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Announce transient now-playing state; not persisted as history.
    async fn now_playing(&self, scrobble: &Scrobble) -> Result<()>;

    /// Record a play that crossed the scrobbling threshold.
    async fn scrobble(&self, scrobble: &Scrobble) -> Result<()>;

    /// Fetch recorded scrobbles, most recent first, with timestamps in
    /// `[from, to]` inclusive. `limit <= 0` means unbounded.
    async fn scrobbles(
        &self,
        limit: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Scrobble>>;
}

/// Build every configured sink. An entry that fails to set up (e.g. an
/// unauthenticated last.fm account) is logged and skipped; zero sinks is a
/// warning, not an error.
pub fn from_config(config: &SinksConfig) -> Vec<Box<dyn Sink>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

    for (label, lastfm) in &config.lastfm {
        debug!(label, "setting up last.fm sink");
        match LastFmSink::from_config(lastfm) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(e) => error!(label, error = %e, "error setting up last.fm sink"),
        }
    }

    for (label, csv) in &config.csv {
        debug!(label, "setting up CSV sink");
        sinks.push(Box::new(CsvSink::new(csv.filename.clone())));
    }

    if sinks.is_empty() {
        warn!("no sinks configured");
    }

    sinks
}
