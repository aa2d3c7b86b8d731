//! The canonical play-event record and its CSV line encoding.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator used when joining and splitting the artist list.
///
/// Chosen over `", "` so that artists like "Tyler, the Creator" survive a
/// write/read round trip.
pub const ARTIST_SEPARATOR: &str = "; ";

/// A single play event: who played what, for how long, starting when.
///
/// Two scrobbles describe the same track when artists, track and album all
/// match; duration and timestamp vary per play and are ignored for identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scrobble {
    pub artists: Vec<String>,
    pub track: String,
    pub album: String,
    /// How long the track was actually played.
    pub duration: Duration,
    /// When the play began.
    pub timestamp: DateTime<Utc>,
}

impl Scrobble {
    /// Identity comparison on (artists, track, album) only.
    #[must_use]
    pub fn same_track(&self, other: &Self) -> bool {
        self.artists == other.artists && self.track == other.track && self.album == other.album
    }

    /// All artists as a single display string.
    #[must_use]
    pub fn join_artists(&self) -> String {
        self.artists.join(ARTIST_SEPARATOR)
    }

    /// Human-readable play duration, e.g. "3m 21s".
    #[must_use]
    pub fn pretty_duration(&self) -> String {
        humantime::format_duration(Duration::from_secs(self.duration.as_secs())).to_string()
    }

    /// Encode as a CSV record.
    ///
    /// Field order: joined artists, track, album, duration in seconds,
    /// unix timestamp. The csv crate's quoting keeps every field (including
    /// Unicode artist names) byte-for-byte recoverable.
    #[must_use]
    pub fn to_record(&self) -> [String; 5] {
        [
            self.join_artists(),
            self.track.clone(),
            self.album.clone(),
            self.duration.as_secs().to_string(),
            self.timestamp.timestamp().to_string(),
        ]
    }

    /// Decode a CSV record written by [`Scrobble::to_record`].
    ///
    /// Any deviation from the expected shape is a hard error, not a skip.
    pub fn from_record(record: &csv::StringRecord) -> Result<Self> {
        if record.len() != 5 {
            return Err(Error::Malformed(format!(
                "expected 5 fields, got {}",
                record.len()
            )));
        }

        let duration_secs: u64 = record[3]
            .parse()
            .map_err(|_| Error::Malformed(format!("invalid duration: {}", &record[3])))?;
        let unix: i64 = record[4]
            .parse()
            .map_err(|_| Error::Malformed(format!("invalid timestamp: {}", &record[4])))?;
        let timestamp = Utc
            .timestamp_opt(unix, 0)
            .single()
            .ok_or_else(|| Error::Malformed(format!("timestamp out of range: {unix}")))?;

        Ok(Self {
            artists: record[0]
                .split(ARTIST_SEPARATOR)
                .map(str::to_string)
                .collect(),
            track: record[1].to_string(),
            album: record[2].to_string(),
            duration: Duration::from_secs(duration_secs),
            timestamp,
        })
    }
}
