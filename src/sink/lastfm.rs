//! last.fm sink: signed scrobbling API calls over HTTPS.
//!
//! Authentication (token exchange) is out of scope; the session key is read
//! from the config file and requests are signed with it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::config::{LastFmConfig, DEFAULT_LASTFM_BASE_URL};
use crate::error::{Error, Result};
use crate::scrobble::Scrobble;

use super::Sink;

/// Largest page size user.getRecentTracks accepts.
const MAX_PAGE_SIZE: i64 = 200;

pub struct LastFmSink {
    http: reqwest::Client,
    base_url: String,
    key: String,
    secret: String,
    session_key: String,
    username: String,
}

impl LastFmSink {
    pub fn from_config(config: &LastFmConfig) -> Result<Self> {
        if config.session_key.is_empty() || config.username.is_empty() {
            return Err(Error::config(
                "last.fm sink is configured, but not authenticated",
            ));
        }

        let base_url = if config.base_url.is_empty() {
            DEFAULT_LASTFM_BASE_URL.to_string()
        } else {
            config.base_url.clone()
        };

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            key: config.key.clone(),
            secret: config.secret.clone(),
            session_key: config.session_key.clone(),
            username: config.username.clone(),
        })
    }

    /// Issue a signed write call (track.updateNowPlaying / track.scrobble).
    async fn write_call(&self, method: &str, mut params: Vec<(&'static str, String)>) -> Result<()> {
        params.push(("method", method.to_string()));
        params.push(("api_key", self.key.clone()));
        params.push(("sk", self.session_key.clone()));

        // `format` and `api_sig` itself are excluded from the signature.
        let signature = sign(&params, &self.secret);
        params.push(("api_sig", signature));
        params.push(("format", "json".to_string()));

        let response = self.http.post(&self.base_url).form(&params).send().await?;
        let body: serde_json::Value = response.json().await?;
        check_api_error(&body)
    }

    fn track_params(scrobble: &Scrobble) -> Vec<(&'static str, String)> {
        vec![
            ("artist", scrobble.join_artists()),
            ("track", scrobble.track.clone()),
            ("album", scrobble.album.clone()),
            ("duration", submitted_duration(scrobble).to_string()),
        ]
    }
}

#[async_trait]
impl Sink for LastFmSink {
    fn name(&self) -> &str {
        "last.fm"
    }

    async fn now_playing(&self, scrobble: &Scrobble) -> Result<()> {
        self.write_call("track.updateNowPlaying", Self::track_params(scrobble))
            .await
    }

    async fn scrobble(&self, scrobble: &Scrobble) -> Result<()> {
        let mut params = Self::track_params(scrobble);
        params.push(("timestamp", scrobble.timestamp.timestamp().to_string()));
        self.write_call("track.scrobble", params).await
    }

    async fn scrobbles(
        &self,
        limit: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Scrobble>> {
        debug!("loading scrobbles from last.fm API");

        let unbounded = limit <= 0;
        let page_size = if unbounded { MAX_PAGE_SIZE } else { limit.min(MAX_PAGE_SIZE) };

        let mut page: i64 = 1;
        let mut collected = Vec::new();

        loop {
            let response = self
                .http
                .get(&self.base_url)
                .query(&[
                    ("method", "user.getRecentTracks".to_string()),
                    ("api_key", self.key.clone()),
                    ("user", self.username.clone()),
                    ("from", from.timestamp().to_string()),
                    ("to", to.timestamp().to_string()),
                    ("limit", page_size.to_string()),
                    ("page", page.to_string()),
                    ("extended", "1".to_string()),
                    ("format", "json".to_string()),
                ])
                .send()
                .await?;

            let body: serde_json::Value = response.json().await?;
            check_api_error(&body)?;
            let parsed: RecentTracksResponse = serde_json::from_value(body)?;

            let total_pages = parsed
                .recenttracks
                .attr
                .total_pages
                .parse::<i64>()
                .unwrap_or(1);

            for track in parsed.recenttracks.tracks {
                if !unbounded && collected.len() as i64 >= limit {
                    return Ok(collected);
                }
                // The currently-playing entry carries no date; it is not
                // history yet.
                let Some(date) = track.date else { continue };
                collected.push(track_to_scrobble(track.name, track.artist, track.album, &date)?);
            }

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(collected)
    }
}

/// The remote service rejects durations under 30 seconds.
fn submitted_duration(scrobble: &Scrobble) -> u64 {
    scrobble.duration.as_secs().max(30)
}

/// MD5 signature over the parameters sorted by name, concatenated as
/// `key1value1key2value2...secret`.
fn sign(params: &[(&'static str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&'static str, String)> = params.iter().collect();
    sorted.sort_by_key(|(key, _)| *key);

    let mut payload = String::new();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload.push_str(secret);

    format!("{:x}", md5::compute(payload.as_bytes()))
}

fn check_api_error(body: &serde_json::Value) -> Result<()> {
    if let Some(code) = body.get("error") {
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(Error::Api(format!("last.fm error {code}: {message}")));
    }
    Ok(())
}

fn track_to_scrobble(
    name: String,
    artist: RecentArtist,
    album: RecentAlbum,
    date: &RecentDate,
) -> Result<Scrobble> {
    let uts: i64 = date
        .uts
        .parse()
        .map_err(|_| Error::Malformed(format!("invalid uts: {}", date.uts)))?;
    let timestamp = Utc
        .timestamp_opt(uts, 0)
        .single()
        .ok_or_else(|| Error::Malformed(format!("timestamp out of range: {uts}")))?;

    Ok(Scrobble {
        // The API reports a single artist string; it is kept as one name
        // rather than split on commas, which would mangle names like
        // "Tyler, the Creator".
        artists: vec![artist.display_name()],
        track: name,
        album: album.name,
        duration: Duration::ZERO,
        timestamp,
    })
}

// user.getRecentTracks response shape (format=json, extended=1).

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracks,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(rename = "track", default)]
    tracks: Vec<RecentTrack>,
    #[serde(rename = "@attr")]
    attr: RecentTracksAttr,
}

#[derive(Debug, Deserialize)]
struct RecentTracksAttr {
    #[serde(rename = "totalPages")]
    total_pages: String,
}

#[derive(Debug, Deserialize)]
struct RecentTrack {
    name: String,
    artist: RecentArtist,
    #[serde(default)]
    album: RecentAlbum,
    /// Absent on the currently-playing entry
    #[serde(default)]
    date: Option<RecentDate>,
}

/// With extended=1 the artist object carries `name`; without it, `#text`.
#[derive(Debug, Default, Deserialize)]
struct RecentArtist {
    #[serde(default)]
    name: String,
    #[serde(rename = "#text", default)]
    text: String,
}

impl RecentArtist {
    fn display_name(self) -> String {
        if self.name.is_empty() {
            self.text
        } else {
            self.name
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RecentAlbum {
    #[serde(rename = "#text", default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecentDate {
    uts: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_independent_of_parameter_order() {
        let secret = "s3cret";
        let a = vec![
            ("artist", "A".to_string()),
            ("track", "T".to_string()),
            ("api_key", "k".to_string()),
        ];
        let b = vec![
            ("api_key", "k".to_string()),
            ("track", "T".to_string()),
            ("artist", "A".to_string()),
        ];
        assert_eq!(sign(&a, secret), sign(&b, secret));
        assert_ne!(sign(&a, secret), sign(&a, "other"));
    }

    #[test]
    fn test_submitted_duration_is_floored_at_30_seconds() {
        let mut scrobble = Scrobble {
            artists: vec!["A".to_string()],
            track: "T".to_string(),
            album: String::new(),
            duration: Duration::from_secs(5),
            timestamp: Utc::now(),
        };
        assert_eq!(submitted_duration(&scrobble), 30);

        scrobble.duration = Duration::from_secs(245);
        assert_eq!(submitted_duration(&scrobble), 245);
    }

    #[test]
    fn test_api_error_body_is_detected() {
        let body = serde_json::json!({"error": 9, "message": "Invalid session key"});
        assert!(check_api_error(&body).is_err());

        let body = serde_json::json!({"recenttracks": {}});
        assert!(check_api_error(&body).is_ok());
    }

    #[test]
    fn test_recent_tracks_response_parses() {
        let body = serde_json::json!({
            "recenttracks": {
                "track": [
                    {
                        "name": "Now Spinning",
                        "artist": {"name": "Someone"},
                        "album": {"#text": "Album"},
                        "@attr": {"nowplaying": "true"}
                    },
                    {
                        "name": "Jóga",
                        "artist": {"name": "Björk"},
                        "album": {"#text": "Homogenic"},
                        "date": {"uts": "1700000000"}
                    }
                ],
                "@attr": {"totalPages": "3"}
            }
        });

        let parsed: RecentTracksResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.recenttracks.attr.total_pages, "3");
        assert_eq!(parsed.recenttracks.tracks.len(), 2);
        assert!(parsed.recenttracks.tracks[0].date.is_none());

        let track = &parsed.recenttracks.tracks[1];
        assert_eq!(track.name, "Jóga");
        assert_eq!(track.date.as_ref().unwrap().uts, "1700000000");
    }
}
