//! Configuration management for scrobbled

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default last.fm API endpoint.
pub const DEFAULT_LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

const DEFAULT_POLL_RATE: u64 = 2;
const DEFAULT_MIN_PLAYBACK_DURATION: u64 = 4 * 60;
const DEFAULT_MIN_PLAYBACK_PERCENT: u32 = 50;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between source polls
    pub poll_rate: u64,

    /// Minimum playback duration in seconds before a play counts as a scrobble
    pub min_playback_duration: u64,

    /// Minimum playback percentage (1-100) of the track length
    pub min_playback_percent: u32,

    /// Send a desktop notification after each successful scrobble
    pub notify_on_scrobble: bool,

    /// Send a desktop notification when a scrobble fails
    pub notify_on_error: bool,

    /// Substrings that suppress a track entirely when found in any metadata field
    pub blacklist: Vec<String>,

    /// Ordered metadata rewrite rules, applied before any event is emitted
    pub regexes: Vec<RegexRule>,

    pub sources: SourcesConfig,
    pub sinks: SinksConfig,
}

/// A single metadata rewrite rule from the config file.
///
/// Compiled into a [`regex::Regex`] at startup; rules that fail to compile
/// are skipped with a warning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexRule {
    /// Match pattern (regex crate syntax)
    #[serde(rename = "match")]
    pub pattern: String,

    /// Replacement template; `$1`-style back-references are supported
    pub replace: String,

    /// Apply to each artist name
    pub artist: bool,

    /// Apply to the track title
    pub track: bool,

    /// Apply to the album title
    pub album: bool,
}

/// Source integrations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// MPRIS over D-Bus
    pub dbus: Option<DbusConfig>,

    /// Shelling out to a media-info CLI
    #[serde(rename = "media-control")]
    pub media_control: Option<MediaControlConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbusConfig {
    /// Bus address; empty means the session bus
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaControlConfig {
    pub command: String,
    pub arguments: Vec<String>,
}

/// Sink integrations, keyed by a user-chosen label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinksConfig {
    pub lastfm: HashMap<String, LastFmConfig>,
    pub csv: HashMap<String, CsvConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LastFmConfig {
    pub base_url: String,
    pub key: String,
    pub secret: String,
    /// Obtained out of band; scrobbled does not run the auth flow itself
    pub session_key: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub filename: PathBuf,
}

// Default implementations

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_rate: DEFAULT_POLL_RATE,
            min_playback_duration: DEFAULT_MIN_PLAYBACK_DURATION,
            min_playback_percent: DEFAULT_MIN_PLAYBACK_PERCENT,
            notify_on_scrobble: false,
            notify_on_error: true,
            blacklist: Vec::new(),
            regexes: Vec::new(),
            sources: SourcesConfig {
                dbus: Some(DbusConfig::default()),
                media_control: None,
            },
            sinks: SinksConfig::default(),
        }
    }
}

impl Default for MediaControlConfig {
    fn default() -> Self {
        Self {
            command: "media-control".to_string(),
            arguments: vec!["get".to_string(), "--now".to_string()],
        }
    }
}

impl Default for LastFmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LASTFM_BASE_URL.to_string(),
            key: String::new(),
            secret: String::new(),
            session_key: String::new(),
            username: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file is created with defaults, matching first-run behavior.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path, creating it if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!(path = %path.display(), "reading config");
            let contents = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let config = Self::default();
            info!(path = %path.display(), "creating default configuration file");
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::config("Could not determine config directory"))?;
        Ok(config_dir.join("scrobbled").join("config.toml"))
    }

    /// Clamp out-of-range values back to their defaults.
    ///
    /// The daemon keeps running on a bad value rather than refusing to start;
    /// each correction is logged.
    pub fn validate(&mut self) {
        if self.poll_rate == 0 || self.poll_rate > 60 {
            warn!(
                poll_rate = self.poll_rate,
                "invalid poll rate, using default value"
            );
            self.poll_rate = DEFAULT_POLL_RATE;
        }

        if self.min_playback_duration == 0 || self.min_playback_duration > 20 * 60 {
            // https://www.last.fm/api/scrobbling#when-is-a-scrobble-a-scrobble
            warn!(
                min_playback_duration = self.min_playback_duration,
                "invalid minimum playback duration, using default value"
            );
            self.min_playback_duration = DEFAULT_MIN_PLAYBACK_DURATION;
        }

        if self.min_playback_percent == 0 || self.min_playback_percent > 100 {
            warn!(
                min_playback_percent = self.min_playback_percent,
                "invalid minimum playback percentage, using default value"
            );
            self.min_playback_percent = DEFAULT_MIN_PLAYBACK_PERCENT;
        }

        if !self.notify_on_error {
            warn!("desktop notifications on failed scrobbles are disabled");
        }

        if let Some(ref mut media_control) = self.sources.media_control {
            if media_control.arguments.is_empty() {
                warn!("no arguments for media-control specified, using `get --now`");
                media_control.arguments = MediaControlConfig::default().arguments;
            }
        }
    }
}
