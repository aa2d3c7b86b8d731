//! Metadata transformer: blacklist filtering and ordered regex rewriting.
//!
//! Every candidate passes through here before it can create a playback
//! session, so a blacklisted identity never produces a "now playing" or a
//! scrobble, and emitted events always carry normalized fields.

use regex::Regex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::source::PlayerSnapshot;

struct CompiledRule {
    regex: Regex,
    replace: String,
    artist: bool,
    track: bool,
    album: bool,
}

/// Compiled blacklist + rewrite pipeline. Pure; no side effects per call.
pub struct Transformer {
    blacklist: Vec<String>,
    rules: Vec<CompiledRule>,
}

impl Transformer {
    /// Compile the configured rules, skipping (and warning about) any whose
    /// pattern does not compile. A bad rule never aborts the rest.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let rules = config
            .regexes
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(regex) => Some(CompiledRule {
                    regex,
                    replace: rule.replace.clone(),
                    artist: rule.artist,
                    track: rule.track,
                    album: rule.album,
                }),
                Err(e) => {
                    warn!(
                        expression = %rule.pattern,
                        error = %e,
                        "error compiling match/replace expression, skipping rule"
                    );
                    None
                }
            })
            .collect();

        Self {
            blacklist: config.blacklist.clone(),
            rules,
        }
    }

    /// Apply the pipeline to a snapshot's metadata.
    ///
    /// Returns `None` when the candidate is blacklisted; otherwise the
    /// snapshot with every rule applied in configured order, each rule seeing
    /// the previous rule's output.
    #[must_use]
    pub fn apply(&self, mut snapshot: PlayerSnapshot) -> Option<PlayerSnapshot> {
        if self.is_blacklisted(&snapshot) {
            debug!(track = %snapshot.track, "candidate is blacklisted, dropping");
            return None;
        }

        for rule in &self.rules {
            if rule.artist {
                for artist in &mut snapshot.artists {
                    *artist = rule
                        .regex
                        .replace_all(artist, rule.replace.as_str())
                        .into_owned();
                }
            }
            if rule.track {
                snapshot.track = rule
                    .regex
                    .replace_all(&snapshot.track, rule.replace.as_str())
                    .into_owned();
            }
            if rule.album {
                snapshot.album = rule
                    .regex
                    .replace_all(&snapshot.album, rule.replace.as_str())
                    .into_owned();
            }
        }

        Some(snapshot)
    }

    fn is_blacklisted(&self, snapshot: &PlayerSnapshot) -> bool {
        self.blacklist.iter().any(|entry| {
            snapshot.artists.iter().any(|a| a.contains(entry))
                || snapshot.track.contains(entry)
                || snapshot.album.contains(entry)
        })
    }
}
