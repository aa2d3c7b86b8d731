//! media-control source: shells out to a media-info CLI and parses its JSON.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

use super::{PlayerSnapshot, Source};

/// Runs a configured command (default `media-control get --now`) on every
/// poll and maps its JSON output to a snapshot.
pub struct MediaControlSource {
    command: String,
    arguments: Vec<String>,
}

/// JSON shape printed by media-control. Everything is optional; a payload
/// without a title counts as nothing playing.
#[derive(Debug, Deserialize)]
struct MediaControlOutput {
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    album: Option<String>,
    /// Total track length in seconds
    #[serde(default)]
    duration: Option<f64>,
    /// Elapsed position in seconds
    #[serde(default, rename = "elapsedTime")]
    elapsed_time: Option<f64>,
    #[serde(default)]
    playing: Option<bool>,
}

impl MediaControlSource {
    #[must_use]
    pub fn new(command: String, arguments: Vec<String>) -> Self {
        Self { command, arguments }
    }
}

#[async_trait]
impl Source for MediaControlSource {
    fn name(&self) -> &str {
        "media-control"
    }

    async fn poll(&self) -> Result<Option<PlayerSnapshot>> {
        let output = Command::new(&self.command)
            .args(&self.arguments)
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::other(format!(
                "{} exited with {}",
                self.command, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if stdout.is_empty() {
            debug!("media-control printed nothing, treating as nothing playing");
            return Ok(None);
        }

        let parsed: MediaControlOutput = serde_json::from_str(stdout)?;
        Ok(snapshot_from_output(parsed))
    }
}

fn snapshot_from_output(output: MediaControlOutput) -> Option<PlayerSnapshot> {
    let track = output.title?;

    Some(PlayerSnapshot {
        artists: output.artist.map(|a| vec![a]).unwrap_or_default(),
        track,
        album: output.album.unwrap_or_default(),
        length: seconds(output.duration),
        position: seconds(output.elapsed_time),
        playing: output.playing.unwrap_or(false),
    })
}

fn seconds(value: Option<f64>) -> Option<Duration> {
    value
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}
